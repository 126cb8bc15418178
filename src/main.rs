use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use impersonatorfinder::batch::{export_run_summary, finalize_run_summary, new_run_summary, parse_handle_file};
use impersonatorfinder::cli::Cli;
use impersonatorfinder::config::{self, AppConfig, CONFIG_PATH};
use impersonatorfinder::logger::{init_tracing, AnalysisLogger, VerbosityLevel};
use impersonatorfinder::pipeline::Pipeline;

/// Written to `<data_dir>` after every run
const RUN_SUMMARY_FILE: &str = "run_summary.json";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(|| PathBuf::from(CONFIG_PATH));

    // Handle --init flag first (before any other processing)
    if cli.init {
        match AppConfig::write_default_config(&config_path) {
            Ok(path) => {
                println!("✅ Created default configuration file at: {}", path.display());
                println!("   Add your API key to this file, then run impersonatorfinder again.");
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        }
    }

    let mut app_config = match AppConfig::load_from_path(&config_path) {
        Ok(cfg) => cfg,
        Err(config::ConfigError::FileNotFound(path)) => match AppConfig::prompt_create_config(&path) {
            Ok(Some(created_path)) => {
                println!("✅ Created default configuration file at: {}", created_path.display());
                println!("   Add your API key to this file, then run impersonatorfinder again.");
                std::process::exit(0);
            }
            Ok(None) => {
                eprintln!("❌ Configuration file not found at: {}", path.display());
                eprintln!("   Run with --init to create a default configuration file.");
                std::process::exit(1);
            }
            Err(e) => {
                eprintln!("❌ Failed to create configuration file: {}", e);
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("❌ Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Command-line overrides, applied before the configuration is shared
    if let Some(jobs) = cli.parallel_jobs {
        if jobs == 0 {
            eprintln!("❌ --parallel-jobs must be at least 1");
            std::process::exit(1);
        }
        app_config.analysis.worker_count = jobs;
    }
    if cli.keep_intermediate {
        app_config.output.save_json = true;
    }
    if cli.log_dir.is_some() {
        app_config.logging.log_dir = cli.log_dir.clone();
    }
    let verbose_count = if app_config.logging.verbose { cli.verbose.max(1) } else { cli.verbose };
    let app_config = app_config;

    let verbosity = VerbosityLevel::from_verbose_count(verbose_count);
    let (log_path, log_guard) = match init_tracing(verbosity, app_config.logging.log_dir.as_deref()) {
        Ok(initialized) => initialized,
        Err(e) => {
            eprintln!("⚠️  Could not set up log file, continuing with console logging only: {}", e);
            (None, None)
        }
    };
    let logger = AnalysisLogger::new(verbosity);
    if let Some(path) = &log_path {
        logger.info(&format!("Writing log to {}", path.display()));
    }

    let scanned = run_scan(&cli, &app_config, &logger).await;
    if let Err(e) = &scanned {
        logger.error(&format!("{:#}", e));
    }
    // Flush the log file before the process can exit
    drop(log_guard);

    if scanned.is_err() {
        std::process::exit(1);
    }
    logger.print_final_summary();
    Ok(())
}

/// Read the input, run the pipeline and write the report and run summary.
async fn run_scan(cli: &Cli, app_config: &AppConfig, logger: &AnalysisLogger) -> Result<()> {
    let input_path = cli.input.as_ref().context("--input is required")?;
    logger.info(&format!("Loading handles from: {}", input_path.display()));
    let handles = parse_handle_file(input_path)?;
    if handles.is_empty() {
        bail!("No valid handles found in input file: {}", input_path.display());
    }

    let output_name = cli.output.as_deref().context("--output is required")?;
    let csv_dir = app_config.output.csv_dir();
    std::fs::create_dir_all(&csv_dir)
        .with_context(|| format!("Failed to create output directory {}", csv_dir.display()))?;
    let report_path = csv_dir.join(output_name);

    let mut summary = new_run_summary();
    logger.start_run(handles.len());

    let pipeline = Pipeline::new(app_config, logger.clone())
        .context("Failed to initialize pipeline")?
        .with_resume(!cli.fresh);

    let outcome = pipeline.run(&handles).await;

    pipeline
        .report(
            &outcome,
            &app_config.analysis.profile_url_base,
            app_config.output.save_json,
            &report_path,
        )
        .context("Failed to write report")?;
    logger.finish_run();

    finalize_run_summary(&mut summary, &handles, &outcome, logger.elapsed().as_secs_f64());
    let summary_path = app_config.output.data_dir.join(RUN_SUMMARY_FILE);
    match export_run_summary(&summary, &summary_path) {
        Ok(()) => logger.debug(&format!("Run summary written to {}", summary_path.display())),
        Err(e) => logger.warn(&format!("Could not write run summary: {:#}", e)),
    }

    Ok(())
}
