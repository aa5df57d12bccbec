//! # Alfresco AI Sync CLI (`alfsync`)
//!
//! ## Usage
//!
//! ```bash
//! alfsync --config ./config/alfsync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `alfsync run` | Backfill tracked folders, then process events until the feed ends |
//! | `alfsync backfill` | Run one backfill pass and exit |
//! | `alfsync folders` | List tracked folders, their watermarks, and whether they need sync |
//!
//! ## Examples
//!
//! ```bash
//! # Follow events piped from a broker bridge
//! broker-tail | alfsync run --events -
//!
//! # Replay a captured event file
//! alfsync run --events ./events.ndjson --progress json
//!
//! # Check what the next backfill would do
//! alfsync folders --config ./config/alfsync.toml
//! ```

use alfresco_ai_sync::{config, engine, feed::EventSource, progress::ProgressMode};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Alfresco AI Sync: keeps an AI document index in step with Alfresco folders.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/alfsync.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "alfsync",
    about = "Alfresco AI Sync: mirror aspect-tagged Alfresco folders into an AI document index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/alfsync.toml")]
    config: PathBuf,

    /// Debug logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Backfill, then dispatch repository events as they arrive.
    ///
    /// Events are read as newline-delimited JSON. Events received during
    /// the backfill are buffered and processed once it completes.
    Run {
        /// Event feed: a file path, or `-` for stdin.
        #[arg(long, default_value = "-")]
        events: String,

        /// Backfill progress on stderr. Defaults to `human` on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Run one backfill pass over all tracked folders and exit.
    Backfill {
        /// Backfill progress on stderr. Defaults to `human` on a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// List tracked folders with their watermarks.
    Folders,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Run { events, progress } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            engine::run_sync(&cfg, EventSource::parse(&events), progress).await?;
        }
        Commands::Backfill { progress } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            engine::run_backfill(&cfg, progress).await?;
        }
        Commands::Folders => {
            engine::list_folders(&cfg).await?;
        }
    }

    Ok(())
}
