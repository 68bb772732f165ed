use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod progress;

/// Top-level CLI for the gdl downloader.
#[derive(Debug, Parser)]
#[command(name = "gdl")]
#[command(about = "gdl: segmented, resumable file downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a single file.
    Download {
        /// HTTP(S) URL, or a Google Drive / OneDrive share link.
        url: String,

        /// Output filename (defaults to the server-provided name).
        #[arg(short, long)]
        output: Option<String>,

        /// Output directory, created if missing.
        #[arg(short = 'd', long)]
        dir: Option<PathBuf>,

        /// Number of concurrent connections.
        #[arg(short, long)]
        concurrency: Option<usize>,
    },

    /// Download every URL listed in a file, one after another.
    Batch {
        /// File with one URL per line; blank lines and `#` comments are
        /// skipped.
        file: PathBuf,

        /// Output directory, created if missing.
        #[arg(short = 'd', long)]
        dir: Option<PathBuf>,

        /// Number of concurrent connections per download.
        #[arg(short, long)]
        concurrency: Option<usize>,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        let cfg = gdl_core::config::load_or_init().unwrap_or_else(|e| {
            tracing::warn!("config unavailable ({:#}); using built-in defaults", e);
            Default::default()
        });

        match cli.command {
            CliCommand::Download {
                url,
                output,
                dir,
                concurrency,
            } => {
                commands::download::run(
                    url,
                    output,
                    dir,
                    concurrency.unwrap_or(cfg.download_concurrency),
                )
                .await
            }
            CliCommand::Batch {
                file,
                dir,
                concurrency,
            } => {
                commands::batch::run(file, dir, concurrency.unwrap_or(cfg.batch_concurrency)).await
            }
        }
    }
}
