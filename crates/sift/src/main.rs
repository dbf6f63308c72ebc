//! Sift - streaming event-enrichment engine
//!
//! # Usage
//!
//! ```bash
//! sift --config configs/config.toml
//! sift --config configs/config.toml --iglu resolver.json
//! ```
//!
//! Exit codes: 0 normal shutdown, 1 configuration or startup failure,
//! 2 fatal runtime failure (including forced shutdown).

mod serve;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Streaming event-enrichment engine
#[derive(Parser, Debug)]
#[command(name = "sift")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Path to a schema-resolver configuration (JSON)
    #[arg(long)]
    iglu: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("failed to initialize logging: {}", e);
        return ExitCode::from(1);
    }

    match serve::run(cli.config, cli.iglu).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(serve::ServeError::Startup(e)) => {
            tracing::error!(error = %e, "startup failed");
            ExitCode::from(1)
        }
        Err(serve::ServeError::Runtime(e)) => {
            tracing::error!(error = %e, "fatal runtime failure");
            ExitCode::from(2)
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
