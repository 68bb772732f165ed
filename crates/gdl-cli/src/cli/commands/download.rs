//! `gdl download` – fetch a single URL.

use anyhow::Result;
use gdl_core::download::{DownloadRequest, Downloader};
use std::path::PathBuf;

use crate::cli::progress::ConsoleProgress;

pub async fn run(
    url: String,
    output: Option<String>,
    dir: Option<PathBuf>,
    concurrency: usize,
) -> Result<()> {
    let downloader = Downloader::new();
    let request = DownloadRequest {
        url,
        concurrency,
        output_name: output,
        output_dir: dir,
    };

    let (sink, reporter) = ConsoleProgress::start();
    let result = downloader.download(request, sink).await;
    reporter.finish().await;

    let path = result?;
    println!("saved to {}", path.display());
    Ok(())
}
