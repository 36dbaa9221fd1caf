use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{bail, ensure, Context, Result};
use tracing::{debug, error, info};

use crate::external_tools::DomainSearch;
use crate::id_mapping::IdMapper;
use crate::models::GeneId;

const INDEX_EXTENSIONS: [&str; 4] = ["h3m", "h3i", "h3f", "h3p"];

/// Runs HMMER `hmmscan` against a pressed profile database.
#[derive(Debug)]
pub struct HmmscanScanner<'a> {
    pub binary: PathBuf,
    pub database: PathBuf,
    pub protein_fasta: PathBuf,
    pub mapper: &'a IdMapper,
    pub cpu: usize,
    pub evalue: f64,
}

impl<'a> HmmscanScanner<'a> {
    /// Checks the inputs, the `hmmpress` index files and that the binary is runnable.
    pub fn new(
        binary: &str,
        database: &Path,
        protein_fasta: &Path,
        mapper: &'a IdMapper,
        cpu: usize,
        evalue: f64,
    ) -> Result<Self> {
        ensure!(database.is_file(), "profile database not found: {}", database.display());
        ensure!(
            protein_fasta.is_file(),
            "protein FASTA not found: {}",
            protein_fasta.display()
        );
        let missing: Vec<String> = INDEX_EXTENSIONS
            .iter()
            .map(|ext| format!("{}.{}", database.display(), ext))
            .filter(|p| !Path::new(p).is_file())
            .collect();
        ensure!(
            missing.is_empty(),
            "profile database is not indexed (run `hmmpress {}`), missing: {}",
            database.display(),
            missing.join(", ")
        );
        let binary = which::which(binary)
            .with_context(|| format!("`{binary}` not found on PATH"))?;

        Ok(Self {
            binary,
            database: database.to_path_buf(),
            protein_fasta: protein_fasta.to_path_buf(),
            mapper,
            cpu,
            evalue,
        })
    }

    /// Copies FASTA records whose header id maps to one of `genes`. Returns the record count.
    pub fn extract_proteins(&self, genes: &BTreeSet<GeneId>, output: &Path) -> Result<usize> {
        let input = File::open(&self.protein_fasta)
            .with_context(|| format!("failed to open {}", self.protein_fasta.display()))?;
        let mut writer = BufWriter::new(
            File::create(output).with_context(|| format!("failed to create {}", output.display()))?,
        );

        let mut extracted = 0;
        let mut keep = false;
        for line in BufReader::new(input).lines() {
            let line = line?;
            if let Some(header) = line.strip_prefix('>') {
                let id = header.split_whitespace().next().unwrap_or_default();
                keep = self
                    .mapper
                    .map(id)
                    .map_or(false, |gene| genes.contains(&gene));
                if keep {
                    extracted += 1;
                }
            }
            if keep {
                writeln!(writer, "{line}")?;
            }
        }
        writer.flush()?;
        info!(
            "Extracted {}/{} protein sequences from {}",
            extracted,
            genes.len(),
            self.protein_fasta.display()
        );
        Ok(extracted)
    }

    pub fn run(&self, query: &Path, domtbl: &Path) -> Result<()> {
        let evalue = self.evalue.to_string();
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--cpu")
            .arg(self.cpu.to_string())
            .arg("--domtblout")
            .arg(domtbl)
            .arg("-E")
            .arg(&evalue)
            .arg("--domE")
            .arg(&evalue)
            .arg(&self.database)
            .arg(query)
            .stdout(Stdio::null());

        info!("Running hmmscan (E <= {}, {} CPUs)", self.evalue, self.cpu);
        debug!("{:?}", cmd);
        let output = cmd
            .output()
            .with_context(|| format!("failed to launch {}", self.binary.display()))?;
        if !output.status.success() {
            error!("hmmscan failed. Stderr:\n{}", String::from_utf8_lossy(&output.stderr));
            bail!("hmmscan exited with status {}", output.status);
        }
        Ok(())
    }
}

impl DomainSearch for HmmscanScanner<'_> {
    fn domain_table(&self, genes: &BTreeSet<GeneId>, work_dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(work_dir)
            .with_context(|| format!("failed to create {}", work_dir.display()))?;
        let query = work_dir.join("query_proteins.fa");
        let domtbl = work_dir.join("domains.domtbl");

        let extracted = self.extract_proteins(genes, &query)?;
        ensure!(extracted > 0, "no protein sequences matched the {} base genes", genes.len());

        self.run(&query, &domtbl)?;
        Ok(domtbl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scanner<'a>(dir: &TempDir, mapper: &'a IdMapper) -> HmmscanScanner<'a> {
        let fasta = dir.path().join("proteins.fa");
        fs::write(
            &fasta,
            ">Bd1G00010.1.p desc\nMKV\nLLA\n>Bd1G00020.1.p\nMAA\n>Bd1G00030.1.p\nMCC\n",
        )
        .unwrap();
        HmmscanScanner {
            binary: PathBuf::from("hmmscan"),
            database: dir.path().join("Pfam-A.hmm"),
            protein_fasta: fasta,
            mapper,
            cpu: 1,
            evalue: 1e-5,
        }
    }

    #[test]
    fn extracts_only_requested_genes() {
        let dir = TempDir::new().unwrap();
        let mapper = IdMapper::new(r"(Bd\dG\d{5})", ".v1").unwrap();
        let s = scanner(&dir, &mapper);
        let genes: BTreeSet<GeneId> = ["Bd1G00010.v1", "Bd1G00030.v1"]
            .iter()
            .map(|g| g.to_string())
            .collect();
        let out = dir.path().join("query.fa");

        assert_eq!(s.extract_proteins(&genes, &out).unwrap(), 2);
        let text = fs::read_to_string(&out).unwrap();
        assert_eq!(text, ">Bd1G00010.1.p desc\nMKV\nLLA\n>Bd1G00030.1.p\nMCC\n");
    }

    #[test]
    fn zero_extracted_sequences_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mapper = IdMapper::new(r"(Bd\dG\d{5})", ".v1").unwrap();
        let s = scanner(&dir, &mapper);
        let genes: BTreeSet<GeneId> = ["Bd9G99999.v1".to_string()].into();
        assert!(s.domain_table(&genes, &dir.path().join("scan")).is_err());
    }

    #[test]
    fn unindexed_database_is_rejected() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("Pfam-A.hmm");
        let fasta = dir.path().join("p.fa");
        fs::write(&db, "HMMER3/f").unwrap();
        fs::write(&fasta, ">x\nM\n").unwrap();
        let mapper = IdMapper::new(r"(x)", "").unwrap();
        let err = HmmscanScanner::new("hmmscan", &db, &fasta, &mapper, 1, 1e-5).unwrap_err();
        assert!(err.to_string().contains("not indexed"));
    }
}
