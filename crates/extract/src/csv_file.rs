//! CSV file URL source.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use siteaudit_core::{Error, Result};

use crate::Source;

/// Reads URLs from the first column of a headered CSV file.
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    /// Validate the input file exists up front so a typo'd path fails
    /// before any browser or network work starts.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            return Err(Error::Config(format!(
                "input file does not exist: {}",
                path.display()
            )));
        }
        Ok(Self { path })
    }
}

#[async_trait]
impl Source for CsvFileSource {
    fn name(&self) -> &'static str {
        "csv file"
    }

    async fn extract(&self) -> Result<Vec<String>> {
        read_urls(&self.path)
    }
}

fn read_urls(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| Error::Extract(format!("failed to read {}: {}", path.display(), e)))?;

    let mut urls = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| Error::Extract(format!("malformed CSV row: {}", e)))?;
        if let Some(url) = record.get(0) {
            let url = url.trim();
            if !url.is_empty() {
                urls.push(url.to_string());
            }
        }
    }

    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_reads_first_column_skipping_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "URL,Name").unwrap();
        writeln!(file, "https://example.com/,Example").unwrap();
        writeln!(file, " https://other.example/ ,Other").unwrap();
        writeln!(file, ",Empty").unwrap();

        let source = CsvFileSource::new(file.path()).unwrap();
        let urls = source.extract().await.unwrap();
        assert_eq!(urls, vec!["https://example.com/", "https://other.example/"]);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        assert!(CsvFileSource::new("/definitely/not/here.csv").is_err());
    }
}
