//! Batch input and run summary
//!
//! Supports:
//! - Text files with one handle or profile URL per line
//! - JSON files with an array of handles or profile URLs
//! - Order-preserving de-duplication of the parsed handles
//! - A JSON summary of every account's outcome for the run

use crate::error::PipelineError;
use crate::pipeline::{AccountDiagnostic, FetchTally, RunOutcome, Stage};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Separator between a profile URL and the handle
pub const URL_HANDLE_SEPARATOR: &str = "/@";

static HANDLE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_.]+$").expect("handle pattern is valid")
});

/// Turn one input entry into a bare handle.
///
/// Accepts `alice`, `@alice` and full profile URLs such as
/// `https://www.tiktok.com/@alice?lang=en`. Returns `None` for blank lines,
/// comments and anything that is not a valid handle afterwards.
pub fn normalize_handle(entry: &str) -> Option<String> {
    let entry = entry.trim();
    if entry.is_empty() || entry.starts_with('#') {
        return None;
    }

    let handle = match entry.rfind(URL_HANDLE_SEPARATOR) {
        Some(idx) => &entry[idx + URL_HANDLE_SEPARATOR.len()..],
        None => entry.strip_prefix('@').unwrap_or(entry),
    };
    let handle = handle
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/')
        .trim();

    is_valid_handle(handle).then(|| handle.to_string())
}

fn is_valid_handle(handle: &str) -> bool {
    !handle.is_empty() && HANDLE_REGEX.is_match(handle)
}

/// Parse a handle list from a file. `.json` files must hold an array; any
/// other extension is read as one entry per line.
pub fn parse_handle_file(path: &Path) -> Result<Vec<String>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read input file: {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let handles = if is_json {
        parse_json_handles(&content)?
    } else {
        parse_line_handles(&content)
    };
    Ok(dedupe_handles(handles))
}

/// One entry per line; invalid entries are skipped
pub fn parse_line_handles(content: &str) -> Vec<String> {
    content.lines().filter_map(normalize_handle).collect()
}

/// JSON array of strings; non-string or invalid entries are skipped
pub fn parse_json_handles(content: &str) -> Result<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(content).context("Failed to parse JSON content")?;

    match value {
        serde_json::Value::Array(items) => Ok(items
            .iter()
            .filter_map(|item| item.as_str())
            .filter_map(normalize_handle)
            .collect()),
        _ => bail!("JSON input must be an array of handles"),
    }
}

/// Drop repeated handles, keeping the first occurrence
pub fn dedupe_handles(handles: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    handles.into_iter().filter(|h| seen.insert(h.clone())).collect()
}

/// Outcome of one account in a run
#[derive(Debug, Clone, Serialize)]
pub struct AccountSummary {
    pub handle: String,
    /// True when the account produced a report row
    pub success: bool,
    pub matched_handle: Option<String>,
    pub composite_score: Option<f64>,
    pub is_suspected_fake: Option<bool>,
    /// Stage at which a diagnostic was raised
    pub stage: Option<Stage>,
    pub error: Option<PipelineError>,
}

/// Summary of a whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_accounts: usize,
    pub successful: usize,
    pub failed: usize,
    pub suspected_fakes: usize,
    pub avatars: FetchTally,
    pub accounts: Vec<AccountSummary>,
    pub total_duration_secs: f64,
    pub started_at: String,
    pub completed_at: String,
}

/// Create a new run summary stamped with the start time
pub fn new_run_summary() -> RunSummary {
    RunSummary {
        total_accounts: 0,
        successful: 0,
        failed: 0,
        suspected_fakes: 0,
        avatars: FetchTally::default(),
        accounts: Vec::new(),
        total_duration_secs: 0.0,
        started_at: Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        completed_at: String::new(),
    }
}

/// Fill the summary from a finished run. `handles` is the de-duplicated input order.
pub fn finalize_run_summary(summary: &mut RunSummary, handles: &[String], outcome: &RunOutcome, duration_secs: f64) {
    let results: HashMap<&str, _> = outcome
        .results
        .iter()
        .map(|r| (r.target_handle.as_str(), r))
        .collect();
    let diagnostics: HashMap<&str, &AccountDiagnostic> = outcome
        .diagnostics
        .iter()
        .map(|d| (d.handle.as_str(), d))
        .collect();

    summary.accounts = handles
        .iter()
        .map(|handle| {
            let result = results.get(handle.as_str());
            let diagnostic = diagnostics.get(handle.as_str());
            AccountSummary {
                handle: handle.clone(),
                success: result.is_some(),
                matched_handle: result.map(|r| r.matched_handle.clone()),
                composite_score: result.map(|r| r.composite_score),
                is_suspected_fake: result.map(|r| r.is_suspected_fake),
                stage: diagnostic.map(|d| d.stage),
                error: diagnostic.map(|d| d.error.clone()),
            }
        })
        .collect();

    summary.completed_at = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    summary.total_accounts = summary.accounts.len();
    summary.successful = summary.accounts.iter().filter(|a| a.success).count();
    summary.failed = summary.total_accounts - summary.successful;
    summary.suspected_fakes = outcome.suspected_fakes();
    summary.avatars = outcome.avatars.clone();
    summary.total_duration_secs = duration_secs;
}

/// Export run summary to a JSON file
pub fn export_run_summary(summary: &RunSummary, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write run summary to: {}", output_path.display()))?;

    Ok(())
}
