//! Download orchestrator: resolve, probe, plan or resume, run the transfer
//! engine, checkpoint once a second, finalize.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::fetch;
use crate::plan::plan_chunks;
use crate::probe;
use crate::progress::ProgressSink;
use crate::resolver::{Resolved, ResolverRegistry};
use crate::retry::RetryPolicy;
use crate::state::{self, DownloadState, SidecarLoad};
use crate::storage::OutputFile;

/// Interval between sidecar checkpoints while fetchers run.
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(1);

/// One download job as requested by the caller.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    /// Requested segment count; forced to 1 when the origin lacks range
    /// support, ignored in favor of a compatible sidecar's layout on resume.
    pub concurrency: usize,
    /// Output filename override; defaults to the probed name.
    pub output_name: Option<String>,
    /// Directory to place the output in, created if missing.
    pub output_dir: Option<PathBuf>,
}

pub struct Downloader {
    retry: RetryPolicy,
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Downloader {
    pub fn new() -> Self {
        Self {
            retry: RetryPolicy::default(),
        }
    }

    /// Downloader with a custom retry schedule (tests, impatient callers).
    pub fn with_retry_policy(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Runs one download to completion and returns the output path.
    ///
    /// On failure the sidecar is left in place (with a final checkpoint) so
    /// the next invocation resumes; the output file is never deleted.
    pub async fn download(
        &self,
        req: DownloadRequest,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<PathBuf> {
        let resolved = resolve_or_fallback(&req.url).await?;

        let meta = {
            let (url, headers) = (resolved.url.clone(), resolved.headers.clone());
            tokio::task::spawn_blocking(move || probe::probe(&url, &headers))
                .await
                .context("probe task panicked")??
        };

        let mut concurrency = req.concurrency.max(1);
        if !meta.range_supported && concurrency > 1 {
            tracing::debug!("origin does not advertise ranges; using a single segment");
            concurrency = 1;
        }

        let name = req.output_name.clone().unwrap_or_else(|| meta.name.clone());
        let output_path = match req.output_dir.as_deref() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
                dir.join(&name)
            }
            _ => PathBuf::from(&name),
        };
        let sidecar = state::sidecar_path(&output_path);

        if meta.size < 0 {
            anyhow::bail!("server did not report a content length for {}", meta.url);
        }
        if meta.size == 0 {
            OutputFile::open(&output_path)?.ensure_len(0)?;
            remove_sidecar(&sidecar);
            return Ok(output_path);
        }

        let mut state = match state::load_sidecar(&sidecar) {
            SidecarLoad::State(s) if state::is_compatible(&s, meta.size, &output_path) => {
                tracing::info!(sidecar = %sidecar.display(), "resuming download");
                s
            }
            SidecarLoad::State(_) => {
                tracing::info!("sidecar does not match the probed file; starting over");
                fresh_state(&resolved.url, &output_path, meta.size, concurrency)
            }
            SidecarLoad::Malformed => {
                tracing::warn!(sidecar = %sidecar.display(), "sidecar unreadable; starting over");
                fresh_state(&resolved.url, &output_path, meta.size, concurrency)
            }
            SidecarLoad::Absent => fresh_state(&resolved.url, &output_path, meta.size, concurrency),
        };
        // The origin may have issued a fresh signed link since the sidecar
        // was written; the stored URL is always discarded.
        state.url = resolved.url.clone();

        let output = OutputFile::open(&output_path)?;
        output.ensure_len(meta.size as u64)?;

        let already = state.total_downloaded();
        if already > 0 {
            progress.add(already as u64);
        }

        let state = Arc::new(state);
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel();
        let checkpointer = tokio::spawn(checkpoint_loop(
            Arc::clone(&state),
            sidecar.clone(),
            stop_rx,
        ));

        // All incomplete chunks run as cooperative transfers on one worker
        // sharing a single connection cache; see `fetch::fetch_chunks`.
        let transfer = {
            let st = Arc::clone(&state);
            let file = output.clone();
            let sink = Arc::clone(&progress);
            let headers = resolved.headers.clone();
            let policy = self.retry;
            tokio::task::spawn_blocking(move || {
                fetch::fetch_chunks(&st, &file, &headers, &sink, &policy)
            })
        };

        let mut first_err: Option<anyhow::Error> = match transfer.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(join) => Some(anyhow::anyhow!("transfer worker panicked: {}", join)),
        };

        let _ = stop_tx.send(());
        let _ = checkpointer.await;

        if first_err.is_none() && !state.all_complete() {
            first_err = Some(anyhow::anyhow!("download finished with incomplete segments"));
        }

        if let Some(err) = first_err {
            // Best-effort final checkpoint so the next run loses nothing.
            if let Err(e) = state::save_sidecar(&sidecar, &state) {
                tracing::warn!("could not checkpoint after failure: {:#}", e);
            }
            return Err(err);
        }

        remove_sidecar(&sidecar);
        Ok(output_path)
    }
}

/// Runs the resolver registry off the runtime; a resolver error falls back
/// to the original URL with no headers.
async fn resolve_or_fallback(input: &str) -> Result<Resolved> {
    let url = input.to_string();
    let outcome = tokio::task::spawn_blocking(move || ResolverRegistry::default().resolve(&url))
        .await
        .context("resolver task panicked")?;
    Ok(match outcome {
        Ok(r) => {
            if r.url != input {
                tracing::info!(url = %r.url, "resolved share link");
            }
            r
        }
        Err(e) => {
            tracing::warn!("could not resolve {}: {:#}; using the URL as-is", input, e);
            Resolved::plain(input)
        }
    })
}

fn fresh_state(url: &str, output: &std::path::Path, size: i64, concurrency: usize) -> DownloadState {
    DownloadState::new(
        url.to_string(),
        output.to_path_buf(),
        size,
        concurrency,
        plan_chunks(size, concurrency),
    )
}

/// Saves a snapshot of the chunk counters once per interval until told to
/// stop. Counter loads are atomic, so a snapshot racing the fetchers still
/// records only values that were really reached.
async fn checkpoint_loop(
    state: Arc<DownloadState>,
    sidecar: PathBuf,
    mut stop: tokio::sync::oneshot::Receiver<()>,
) {
    let mut tick = tokio::time::interval(CHECKPOINT_INTERVAL);
    tick.tick().await; // consume the immediate first tick
    loop {
        tokio::select! {
            _ = tick.tick() => {
                if let Err(e) = state::save_sidecar(&sidecar, &state) {
                    tracing::warn!("checkpoint failed: {:#}", e);
                }
            }
            _ = &mut stop => break,
        }
    }
}

fn remove_sidecar(sidecar: &std::path::Path) {
    if let Err(e) = fs::remove_file(sidecar) {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("could not remove sidecar {}: {}", sidecar.display(), e);
        }
    }
}
