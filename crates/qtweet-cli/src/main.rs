//! QTweet CLI — entry point.
//!
//! # Commands
//!
//! - `qtweet run [--logs]` — connect to Discord and relay the feed
//! - `qtweet status` — show configuration and subscription counts
//! - `qtweet init` — write the default configuration

mod helpers;
mod init;
mod run;
mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// QTweet — relay feed posts into Discord channels
#[derive(Parser)]
#[command(name = "qtweet", version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.qtweet/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Discord and start relaying
    Run {
        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Show configuration and subscription status
    Status,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run { logs } => {
            init_logging(logs);
            run::run(config_path).await
        }
        Commands::Status => status::run(config_path).await,
        Commands::Init { force } => init::run(config_path, force),
    }
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("qtweet=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
