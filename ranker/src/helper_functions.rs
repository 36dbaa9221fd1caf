use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use polars::prelude::*;
use sha2::{Digest, Sha256};

/// Reads a tab-separated table with a header row. Every column is read as a string so
/// identifiers like `AT1G01010` or `0012501` are never reinterpreted.
pub fn read_tsv(path: &Path) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(b'\t')
                .with_quote_char(None)
                .with_truncate_ragged_lines(true),
        )
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))
        .and_then(|reader| reader.finish())
        .with_context(|| format!("failed to read table {}", path.display()))
}

/// Name of the first column in `candidates` that the frame actually has.
pub fn first_present_column<'a>(df: &DataFrame, candidates: &[&'a str]) -> Option<&'a str> {
    let names = df.get_column_names();
    candidates
        .iter()
        .copied()
        .find(|c| names.iter().any(|n| n.as_str() == *c))
}

/// Owned string values of a column, nulls as empty strings.
pub fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let column = df
        .column(name)
        .with_context(|| format!("missing column `{name}`"))?;
    let values = column
        .str()
        .with_context(|| format!("column `{name}` is not a string column"))?;
    Ok(values
        .into_iter()
        .map(|v| v.unwrap_or_default().trim().to_string())
        .collect())
}

pub fn write_tsv(df: &mut DataFrame, path: &Path, float_precision: Option<usize>) -> Result<()> {
    let mut file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b'\t')
        .with_float_precision(float_precision)
        .finish(df)
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Hex-encoded SHA-256 of a file's contents.
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Keeps at most `max` characters, cutting on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn reads_ids_as_strings() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.tsv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "gene\tGO\tlevel").unwrap();
        writeln!(f, "Bd1G00010.1\tGO:0012501\tBP").unwrap();
        writeln!(f, "Bd1G00020.1\t0001\tBP").unwrap();

        let df = read_tsv(&path).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(string_column(&df, "GO").unwrap(), vec!["GO:0012501", "0001"]);
        assert_eq!(first_present_column(&df, &["locus_name", "gene"]), Some("gene"));
        assert_eq!(first_present_column(&df, &["nope"]), None);
        assert!(string_column(&df, "nope").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_tsv(Path::new("/definitely/not/here.tsv")).is_err());
    }

    #[test]
    fn writes_tab_separated_output() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.tsv");
        let mut df = df!("gene_id" => ["a", "b"], "total_score" => [1.25f64, 2.0]).unwrap();
        write_tsv(&mut df, &path, Some(2)).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().next(), Some("gene_id\ttotal_score"));
        assert!(text.contains("a\t1.25"));
    }

    #[test]
    fn hashes_file_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.txt");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate_chars("ärger", 2), "är");
        assert_eq!(truncate_chars("ab", 200), "ab");
    }
}
