mod cli;
mod engine;
mod error;
mod leaderboard;
mod model;
mod orchestrator;
mod store;
mod text_summary;
#[cfg(feature = "tui")]
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `--log-file` routes logs to that file. Otherwise they go to stderr, except in TUI mode
/// where stderr would draw over the screen and logs are discarded.
fn init_tracing(args: &cli::Cli) -> Result<Option<WorkerGuard>> {
    let default_level = if args.is_tui() { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if let Some(path) = args.log_file.as_deref() {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open log file {}", path.display()))?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(writer)
            .init();
        return Ok(Some(guard));
    }

    if args.is_tui() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::sink)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(None)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let _log_guard = init_tracing(&args)?;

    cli::run(args).await
}
