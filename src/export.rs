//! CSV report writer for match results.

use crate::profile::MatchResult;
use anyhow::{Context, Result};
use csv::Writer;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

pub const REPORT_HEADERS: [&str; 4] = ["Real Account", "Fake Account Link", "Percentage", "Status"];

/// Canonical profile link for a handle
pub fn profile_url(base: &str, handle: &str) -> String {
    format!("{}{}", base, handle)
}

/// Boolean column as written in the report
fn status_label(is_suspected_fake: bool) -> &'static str {
    if is_suspected_fake {
        "True"
    } else {
        "False"
    }
}

pub fn export_csv(results: &[MatchResult], profile_url_base: &str, output_path: &Path) -> Result<()> {
    debug!("Exporting {} match results to CSV: {}", results.len(), output_path.display());

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create report directory: {}", parent.display()))?;
    }

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create report: {}", output_path.display()))?;
    let mut wtr = Writer::from_writer(file);

    wtr.write_record(REPORT_HEADERS)?;

    for result in results {
        wtr.write_record([
            profile_url(profile_url_base, &result.target_handle),
            profile_url(profile_url_base, &result.matched_handle),
            result.composite_score.to_string(),
            status_label(result.is_suspected_fake).to_string(),
        ])?;
    }

    wtr.flush()?;
    info!("Exported {} match results to CSV: {}", results.len(), output_path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn result(target: &str, matched: &str, score: f64, fake: bool) -> MatchResult {
        MatchResult {
            target_handle: target.to_string(),
            matched_handle: matched.to_string(),
            composite_score: score,
            is_suspected_fake: fake,
        }
    }

    #[test]
    fn test_profile_url() {
        assert_eq!(profile_url("https://www.tiktok.com/@", "alice"), "https://www.tiktok.com/@alice");
    }

    #[test]
    fn test_export_csv_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("CSVs").join("out.csv");
        let results = vec![
            result("alice", "alice2", 2.0, true),
            result("carol", "no-candidates-found", 0.0, false),
            result("dave", "dave_x", 1.5, false),
        ];

        export_csv(&results, "https://www.tiktok.com/@", &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(headers, REPORT_HEADERS);

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[0][0], "https://www.tiktok.com/@alice");
        assert_eq!(&rows[0][1], "https://www.tiktok.com/@alice2");
        assert_eq!(&rows[0][2], "2");
        assert_eq!(&rows[0][3], "True");
        assert_eq!(&rows[1][3], "False");
        assert_eq!(&rows[2][2], "1.5");
    }

    #[test]
    fn test_export_empty_writes_headers_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        export_csv(&[], "https://x/@", &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim(), "Real Account,Fake Account Link,Percentage,Status");
    }
}
