//! `gdl batch` – sequential downloads from a URL list file.

use anyhow::{Context, Result};
use gdl_core::download::{DownloadRequest, Downloader};
use std::path::PathBuf;

use crate::cli::progress::ConsoleProgress;

/// Runs every URL in the batch file, one after another. A failed URL is
/// reported and skipped; only an unreadable batch file fails the command.
pub async fn run(file: PathBuf, dir: Option<PathBuf>, concurrency: usize) -> Result<()> {
    let list = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read batch file {}", file.display()))?;

    let downloader = Downloader::new();
    for url in batch_urls(&list) {
        println!("downloading {}", url);
        let request = DownloadRequest {
            url: url.to_string(),
            concurrency,
            output_name: None,
            output_dir: dir.clone(),
        };

        let (sink, reporter) = ConsoleProgress::start();
        let result = downloader.download(request, sink).await;
        reporter.finish().await;

        match result {
            Ok(path) => println!("saved to {}", path.display()),
            Err(e) => {
                tracing::error!("download of {} failed: {:#}", url, e);
                eprintln!("error downloading {}: {:#}", url, e);
            }
        }
    }
    Ok(())
}

/// Downloadable lines: trimmed, non-empty, not `#` comments.
fn batch_urls(list: &str) -> impl Iterator<Item = &str> {
    list.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}
