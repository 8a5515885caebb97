//! CSV report sink.
//!
//! Renders the ordered audit results into a flat CSV: one row per site,
//! one column per enabled check, the header row derived from the batch's
//! check selection.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::info;

use siteaudit_core::{AuditResult, CheckKind, CheckSelection, CheckValue, Error, Result};

/// Writes audit results to a CSV file.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    /// Validate the output path by creating the file up front, so an
    /// unwritable path fails before any browser work starts.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(Error::Config("output path cannot be empty".to_string()));
        }

        File::create(&path).map_err(|e| {
            Error::Config(format!("cannot create output file {}: {}", path.display(), e))
        })?;

        Ok(Self { path })
    }

    /// Write the header row and one row per result. All results in a
    /// batch share the same enabled set, so the header comes from the
    /// batch selection rather than any individual result.
    pub fn write(&self, selection: &CheckSelection, results: &[AuditResult]) -> Result<()> {
        let file = File::create(&self.path)
            .map_err(|e| Error::Report(format!("failed to open {}: {}", self.path.display(), e)))?;
        let mut writer = csv::Writer::from_writer(file);

        let mut headers = vec!["Website".to_string()];
        headers.extend(selection.enabled().map(|kind| kind.header().to_string()));
        headers.push("Audit Errors".to_string());
        writer
            .write_record(&headers)
            .map_err(|e| Error::Report(format!("failed to write header: {}", e)))?;

        for result in results {
            let mut row = vec![result.site.url()];
            for kind in selection.enabled() {
                row.push(render_value(kind, result.value(kind)));
            }
            row.push(result.audit_errors.join(";\n"));

            writer
                .write_record(&row)
                .map_err(|e| Error::Report(format!("failed to write row: {}", e)))?;
        }

        writer
            .flush()
            .map_err(|e| Error::Report(format!("failed to flush report: {}", e)))?;

        info!(path = %self.path.display(), rows = results.len(), "report written");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Render one cell. A missing value means the check never sampled
/// (pipeline aborted early) and renders as the kind's zero value.
fn render_value(kind: CheckKind, value: Option<&CheckValue>) -> String {
    let zero = kind.zero_value();
    match value.unwrap_or(&zero) {
        CheckValue::Flag(ok) => flag_mark(*ok).to_string(),
        CheckValue::Millis(ms) => ms.to_string(),
        CheckValue::Findings(findings) => findings.join(";\n"),
    }
}

fn flag_mark(ok: bool) -> &'static str {
    if ok {
        "✅"
    } else {
        "❌"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siteaudit_core::Site;

    fn site(domain: &str) -> Site {
        Site::parse(&format!("https://{}/", domain)).unwrap()
    }

    fn read(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::Reader::from_path(path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        let mut rows = vec![headers];
        for record in reader.records() {
            rows.push(record.unwrap().iter().map(String::from).collect());
        }
        rows
    }

    #[test]
    fn test_header_derived_from_selection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let sink = CsvSink::create(&path).unwrap();

        let selection = CheckSelection::from_names("security,lcp,headers").unwrap();
        sink.write(&selection, &[]).unwrap();

        let rows = read(&path);
        assert_eq!(
            rows[0],
            vec!["Website", "Secure", "LCP (ms)", "Missing Headers", "Audit Errors"]
        );
    }

    #[test]
    fn test_rows_render_values_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let sink = CsvSink::create(&path).unwrap();

        let selection = CheckSelection::from_names("security,lcp,console").unwrap();

        let mut ok = AuditResult::new(site("good.example"));
        ok.record(CheckKind::Secure, CheckValue::Flag(true));
        ok.record(CheckKind::Lcp, CheckValue::Millis(812.0));
        ok.record(
            CheckKind::ConsoleErrors,
            CheckValue::Findings(vec!["[Error]: boom".to_string(), "[Warning]: odd".to_string()]),
        );

        // A site that failed before any check could sample.
        let mut failed = AuditResult::new(site("bad.example"));
        failed.push_error("main document returned status 503");

        sink.write(&selection, &[ok, failed]).unwrap();

        let rows = read(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows[1],
            vec![
                "https://good.example/",
                "✅",
                "812",
                "[Error]: boom;\n[Warning]: odd",
                "",
            ]
        );
        // Unsampled checks render as zero values, errors as a joined column.
        assert_eq!(
            rows[2],
            vec![
                "https://bad.example/",
                "❌",
                "0",
                "",
                "main document returned status 503",
            ]
        );
    }

    #[test]
    fn test_unwritable_path_is_config_error() {
        assert!(CsvSink::create("/definitely/not/a/dir/report.csv").is_err());
    }
}
