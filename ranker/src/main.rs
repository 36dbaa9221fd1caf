use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::ConfigDocument;
use crate::pipeline::{extract_go_list, run, RunOptions};

mod config;
mod data_handling;
mod external_tools;
mod helper_functions;
mod id_mapping;
mod models;
mod output;
mod pipeline;
mod scoring;
mod selection;

#[derive(Parser)]
#[command(name = "gene-signature-ranker", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score every GO-derived gene on all evidence layers and select the high-confidence set
    Rank {
        /// YAML configuration file
        #[arg(short, long)]
        config: PathBuf,
        /// Also write QC plots and the QC report
        #[arg(long)]
        qc: bool,
        /// Appended to the run id
        #[arg(long)]
        run_name: Option<String>,
        /// Reuse an existing run directory with the same id
        #[arg(long)]
        overwrite: bool,
        #[arg(long, default_value = "results")]
        results_dir: PathBuf,
    },
    /// Write the GO-derived gene list with categories and term descriptions
    Extract {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Rank {
            config,
            qc,
            run_name,
            overwrite,
            results_dir,
        } => {
            info!("Starting gene signature ranking with {}", config.display());
            let doc = ConfigDocument::load(&config)?;
            let options = RunOptions {
                results_dir,
                run_name,
                overwrite,
                qc,
            };
            let run_dir = run(&doc, &options)?;
            info!("Outputs in {}", run_dir.outputs.display());
        }
        Command::Extract { config, output } => {
            let doc = ConfigDocument::load(&config)?;
            let n = extract_go_list(&doc.config, &output)?;
            info!("Extracted {} genes", n);
        }
    }
    Ok(())
}
