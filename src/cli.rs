use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "impersonatorfinder")]
#[command(about = "Finds the most likely impersonating account for each profile in a list")]
#[command(version)]
pub struct Cli {
    /// Create default configuration file at ./config/impersonatorfinder.toml
    #[arg(long)]
    pub init: bool,

    /// Configuration file (defaults to ./config/impersonatorfinder.toml)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// File with one handle or profile URL per line, or a JSON array of them
    #[arg(short, long, value_name = "FILE", required_unless_present = "init")]
    pub input: Option<PathBuf>,

    /// Report filename, written under <data_dir>/CSVs/ (must end with .csv)
    #[arg(short, long, value_name = "NAME", value_parser = parse_csv_name, required_unless_present = "init")]
    pub output: Option<String>,

    /// Workers per pipeline stage (overrides config)
    #[arg(short = 'j', long, value_name = "N")]
    pub parallel_jobs: Option<usize>,

    /// Verbose logging (use -v for INFO, -vv for DEBUG)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Keep per-account JSON documents after the report is written (overrides config)
    #[arg(long)]
    pub keep_intermediate: bool,

    /// Ignore state and avatars left by an earlier run
    #[arg(long)]
    pub fresh: bool,

    /// Directory for the per-run log file (overrides config)
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

/// Report names must be a plain `.csv` filename
fn parse_csv_name(value: &str) -> Result<String, String> {
    let value = value.trim();
    if !value.to_lowercase().ends_with(".csv") || value.len() <= ".csv".len() {
        return Err(format!("'{}' is not a .csv filename", value));
    }
    if value.contains('/') || value.contains('\\') {
        return Err(format!("'{}' must be a filename, not a path", value));
    }
    Ok(value.to_string())
}
