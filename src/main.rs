use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use stsrotate::{cli::Cli, constants};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match init_logging(cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match cli.execute().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Terminal output filtered by verbosity, plus an append-only log file at INFO
fn init_logging(verbose: u8) -> anyhow::Result<WorkerGuard> {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    // Allow RUST_LOG env var to override verbosity flag
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let log_dir = constants::app_dir().context("Failed to determine log directory")?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create directory: {}", log_dir.display()))?;
    let appender = tracing_appender::rolling::never(&log_dir, constants::LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let terminal = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_thread_ids(verbose >= 3)
        .with_file(verbose >= 3)
        .with_line_number(verbose >= 3)
        .compact()
        .with_filter(filter);

    let file = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(LevelFilter::INFO);

    tracing_subscriber::registry()
        .with(terminal)
        .with(file)
        .try_init()?;

    Ok(guard)
}
