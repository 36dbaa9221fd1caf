pub mod qc;
pub mod reports;
pub mod run_manager;
