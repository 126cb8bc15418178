use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Silent = 0,    // Only progress bars and the final summary
    Summary = 1,   // Stage transitions (default)
    Detailed = 2,  // Per-account outcomes and warnings
    Debug = 3,     // Everything
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }

    /// Default `tracing` directive for this level; `RUST_LOG` takes precedence.
    pub fn tracing_directive(&self) -> &'static str {
        match self {
            VerbosityLevel::Silent | VerbosityLevel::Summary => "warn",
            VerbosityLevel::Detailed => "impersonatorfinder=info,warn",
            VerbosityLevel::Debug => "impersonatorfinder=debug,info",
        }
    }
}

/// Install the global tracing subscriber: stderr always, plus a timestamped
/// file under `log_dir` when one is configured. The returned guard flushes
/// the file writer on drop and must be held until exit.
pub fn init_tracing(
    verbosity: VerbosityLevel,
    log_dir: Option<&Path>,
) -> anyhow::Result<(Option<PathBuf>, Option<WorkerGuard>)> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.tracing_directive()));

    let mut log_path = None;
    let mut guard = None;
    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_name = log_file_name(chrono::Local::now());
            let appender = tracing_appender::rolling::never(dir, &file_name);
            let (writer, file_guard) = tracing_appender::non_blocking(appender);
            log_path = Some(dir.join(file_name));
            guard = Some(file_guard);
            Some(fmt::layer().with_writer(writer).with_ansi(false))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .with(file_layer)
        .try_init()?;

    Ok((log_path, guard))
}

/// One log file per run, named after the local start time.
pub fn log_file_name(now: chrono::DateTime<chrono::Local>) -> String {
    format!("{}.log", now.format("%d-%m-%Y %H-%M-%S"))
}

#[derive(Clone)]
pub struct AnalysisLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<RwLock<Option<ProgressBar>>>,
    run_metadata: Arc<Mutex<RunMetadata>>,
}

#[derive(Default, Clone)]
struct RunMetadata {
    start_time: Option<SystemTime>,
    end_time: Option<SystemTime>,
    accounts_requested: usize,
    results_written: usize,
    suspected_fakes: usize,
    failed_accounts: usize,
    avatars_downloaded: usize,
    avatar_failures: usize,
    output_file: String,
}

impl AnalysisLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(RwLock::new(None)),
            run_metadata: Arc::new(Mutex::new(RunMetadata::default())),
        }
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        self.verbosity
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("INFO", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("WARN", message);
        }
    }

    pub fn error(&self, message: &str) {
        // Errors are shown at every verbosity
        self.print_message("ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Debug {
            self.print_message("DEBUG", message);
        }
    }

    fn print_message(&self, level: &str, message: &str) {
        let msg = format!("[{}] {}: {}", timestamp(), level, message);

        // Route through the progress bar so the bar is redrawn below the line
        if let Ok(guard) = self.progress_bar.try_read() {
            if let Some(pb) = guard.as_ref() {
                pb.println(msg);
                return;
            }
        }

        eprintln!("{}", msg);
    }

    fn with_metadata(&self, update: impl FnOnce(&mut RunMetadata)) {
        if let Ok(mut metadata) = self.run_metadata.lock() {
            update(&mut metadata);
        }
    }

    pub fn start_run(&self, accounts: usize) {
        self.with_metadata(|m| {
            m.start_time = Some(SystemTime::now());
            m.accounts_requested = accounts;
        });
        self.info(&format!("Starting impersonation scan for {} accounts", accounts));
    }

    /// Replace the progress bar with a fresh one for `stage`.
    pub async fn start_stage(&self, stage: &str, total: u64) {
        let pb = if self.verbosity == VerbosityLevel::Silent || total == 0 {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total)
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message(stage.to_string());

        let mut guard = self.progress_bar.write().await;
        if let Some(old) = guard.replace(pb) {
            old.finish_and_clear();
        }
        drop(guard);

        self.debug(&format!("Stage {} started with {} tasks", stage, total));
    }

    pub async fn advance_progress(&self, steps: u64) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.inc(steps);
        }
    }

    pub async fn finish_stage(&self, message: &str) {
        let mut guard = self.progress_bar.write().await;
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
        drop(guard);

        self.info(message);
    }

    pub fn log_account_failed(&self, handle: &str, stage: &str, error: &str) {
        self.with_metadata(|m| m.failed_accounts += 1);
        self.warn(&format!("@{} dropped at {}: {}", handle, stage, error));
    }

    pub fn log_no_candidates(&self, handle: &str) {
        self.warn(&format!("@{} has no candidate profiles", handle));
    }

    pub fn log_match(&self, target: &str, matched: &str, score: f64, suspected: bool) {
        if suspected {
            self.with_metadata(|m| m.suspected_fakes += 1);
            self.info(&format!("@{} -> @{} (score {}) suspected impersonator", target, matched, score));
        } else {
            self.debug(&format!("@{} -> @{} (score {})", target, matched, score));
        }
    }

    pub fn record_avatar_tally(&self, downloaded: usize, failed: usize) {
        self.with_metadata(|m| {
            m.avatars_downloaded = downloaded;
            m.avatar_failures = failed;
        });
    }

    pub fn log_export_success(&self, path: &str, rows: usize) {
        self.with_metadata(|m| {
            m.output_file = path.to_string();
            m.results_written = rows;
        });
        self.info(&format!("Report written: {} ({} rows)", path, rows));
    }

    pub fn finish_run(&self) {
        self.with_metadata(|m| m.end_time = Some(SystemTime::now()));
    }

    pub fn elapsed(&self) -> Duration {
        self.run_metadata
            .lock()
            .ok()
            .and_then(|m| {
                let start = m.start_time?;
                let end = m.end_time.unwrap_or_else(SystemTime::now);
                end.duration_since(start).ok()
            })
            .unwrap_or_default()
    }

    pub fn print_final_summary(&self) {
        let metadata = match self.run_metadata.lock() {
            Ok(m) => m.clone(),
            Err(_) => return,
        };
        let elapsed = self.elapsed();

        print!("\x1b[2K\r");
        let _ = io::stdout().flush();

        println!("\n=== SCAN SUMMARY ===");
        println!("Accounts Requested: {}", metadata.accounts_requested);
        println!("Results Written: {}", metadata.results_written);
        println!("Accounts Dropped: {}", metadata.failed_accounts);
        println!("Suspected Impersonators: {}", metadata.suspected_fakes);
        println!(
            "Avatars Downloaded: {} ({} failed)",
            metadata.avatars_downloaded, metadata.avatar_failures
        );
        if !metadata.output_file.is_empty() {
            println!("Report: {}", metadata.output_file);
        }
        println!("Total Execution Time: {:.2}s", elapsed.as_secs_f64());
        println!("====================\n");
    }
}

fn timestamp() -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = now.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        (secs / 3600) % 24,
        (secs % 3600) / 60,
        secs % 60,
        now.subsec_millis()
    )
}
