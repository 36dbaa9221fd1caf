//! Run directories, config snapshots, the manifest and the `latest` pointer.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::helper_functions::sha256_file;

pub const CONFIG_SNAPSHOT: &str = "config_used.yaml";
pub const MANIFEST: &str = "manifest.json";

#[derive(Debug, Clone)]
pub struct RunDirectory {
    pub run_id: String,
    pub root: PathBuf,
    pub outputs: PathBuf,
    pub qc: PathBuf,
    pub domain_scan: PathBuf,
}

impl RunDirectory {
    /// Path relative to the run root, as recorded in the manifest.
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

/// First 8 hex chars of the SHA-256 of the key-sorted JSON form of the config.
pub fn config_hash(raw: &serde_yaml::Value) -> Result<String> {
    let canonical = serde_json::to_value(raw).context("config cannot be expressed as JSON")?;
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_string(&canonical)?.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    Ok(digest[..8].to_string())
}

pub fn run_id(created: &DateTime<Local>, prefix: &str, hash: &str, name: Option<&str>) -> String {
    let mut id = format!("{}__{}__{}", created.format("%Y-%m-%d_%H%M%S"), prefix, hash);
    if let Some(name) = name.filter(|n| !n.is_empty()) {
        id.push_str("__");
        id.push_str(name);
    }
    id
}

pub fn create_run_dir(results_dir: &Path, id: String, overwrite: bool) -> Result<RunDirectory> {
    let root = results_dir.join("runs").join(&id);
    if root.exists() && !overwrite {
        bail!(
            "run directory already exists: {} (use --overwrite to reuse it, or change the config or run name)",
            root.display()
        );
    }

    let run = RunDirectory {
        run_id: id,
        outputs: root.join("outputs"),
        qc: root.join("qc"),
        domain_scan: root.join("domain_scan"),
        root,
    };
    for dir in [&run.outputs, &run.qc] {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    info!("Run directory: {}", run.root.display());
    Ok(run)
}

pub fn write_config_snapshot(run: &RunDirectory, raw: &serde_yaml::Value) -> Result<PathBuf> {
    let path = run.root.join(CONFIG_SNAPSHOT);
    let text = serde_yaml::to_string(raw)?;
    fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

/// Points `<results>/latest` at the run, as a relative symlink where supported.
pub fn update_latest(results_dir: &Path, run: &RunDirectory) -> Result<()> {
    let link = results_dir.join("latest");
    if fs::symlink_metadata(&link).is_ok() {
        fs::remove_file(&link).with_context(|| format!("failed to replace {}", link.display()))?;
    }
    let target = Path::new("runs").join(&run.run_id);

    #[cfg(unix)]
    {
        if std::os::unix::fs::symlink(&target, &link).is_ok() {
            return Ok(());
        }
        warn!("Could not create {} symlink, writing latest_path.txt", link.display());
    }

    let absolute = fs::canonicalize(&run.root).unwrap_or_else(|_| run.root.clone());
    let fallback = results_dir.join("latest_path.txt");
    fs::write(&fallback, format!("{}\n", absolute.display()))
        .with_context(|| format!("failed to write {}", fallback.display()))
}

// ─── Manifest ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub path: PathBuf,
    pub description: String,
    pub rows: Option<usize>,
}

impl ManifestEntry {
    pub fn new(path: PathBuf, description: &str, rows: Option<usize>) -> Self {
        Self {
            path,
            description: description.to_string(),
            rows,
        }
    }
}

#[derive(Debug, Serialize)]
struct ManifestFile {
    path: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    rows: Option<usize>,
    size_bytes: u64,
    sha256: String,
}

#[derive(Debug, Serialize)]
struct Manifest {
    run_id: String,
    created: String,
    files: Vec<ManifestFile>,
}

/// Writes `outputs/manifest.json` for every listed file that exists.
pub fn write_manifest(run: &RunDirectory, entries: &[ManifestEntry]) -> Result<PathBuf> {
    let mut files = Vec::new();
    for entry in entries {
        if !entry.path.is_file() {
            continue;
        }
        let size_bytes = fs::metadata(&entry.path)?.len();
        files.push(ManifestFile {
            path: run.relative(&entry.path),
            description: entry.description.clone(),
            rows: entry.rows,
            size_bytes,
            sha256: sha256_file(&entry.path)?,
        });
    }

    let manifest = Manifest {
        run_id: run.run_id.clone(),
        created: Local::now().to_rfc3339(),
        files,
    };
    let path = run.outputs.join(MANIFEST);
    fs::write(&path, serde_json::to_string_pretty(&manifest)?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!("Manifest lists {} files", manifest.files.len());
    Ok(path)
}
