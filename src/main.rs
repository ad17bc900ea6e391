use anyhow::{Context, Result};
use clap::Parser;
use scale_diag::cli;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "scale_diag=info";

/// Text and JSON modes log to stderr; the TUI owns the terminal, so it logs
/// to a file under the platform data directory instead.
fn init_logging(args: &cli::Cli) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let uses_tui = cfg!(feature = "tui") && !args.json && !args.text;

    if !uses_tui {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
        return Ok(None);
    }

    let dir = dirs::data_local_dir()
        .context("no local data directory for the log file")?
        .join("scale-diag");
    std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, "scale-diag.log"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(Some(guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_non_tui = args.json || args.text;
    let _log_guard = init_logging(&args)?;

    match cli::run(args).await {
        Ok(()) => {
            // Explicitly exit with code 0 on success, especially for non-TUI modes
            if is_non_tui {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "exiting with failure");
            Err(e)
        }
    }
}
