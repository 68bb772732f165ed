//! Segment transfer engine: every incomplete chunk becomes one ranged GET
//! registered on a single curl multi handle, so all fetchers share that
//! handle's connection cache (one pool for the whole download, HTTP/1.1
//! keep-alive reuse across segments and retries).
//!
//! A fetcher owns its chunk exclusively: it only writes inside
//! `[start, end]` and only advances its own counter. Combined with the
//! planner's non-overlapping partition, the finished file equals the
//! origin's bytes by construction.

use anyhow::{Context, Result};
use curl::easy::{Easy2, Handler, HttpVersion, WriteError};
use curl::multi::{Easy2Handle, Multi};
use std::collections::HashMap;
use std::str;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::http;
use crate::progress::ProgressSink;
use crate::retry::{classify, RetryDecision, RetryPolicy, SegmentError};
use crate::state::{Chunk, DownloadState};
use crate::storage::OutputFile;

/// Streaming read buffer handed to libcurl.
const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Upper bound on one multi poll, so retry deadlines are picked up promptly.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Downloads every incomplete chunk of `state`, retrying per `policy`.
///
/// All transfers run cooperatively on the caller's thread via one
/// `curl::multi::Multi`; its connection cache holds up to
/// [`http::POOL_CONNECTION_CACHE`] idle connections (total and per host) and
/// drops connections older than [`http::POOL_IDLE_TIMEOUT`], so a retry or a
/// late segment reuses a sibling's parked connection instead of opening a
/// fresh one. Each retry attempt resumes from `start + downloaded`; bytes
/// that landed before a failure are never re-fetched.
///
/// Blocking; the orchestrator runs this on the blocking pool.
pub fn fetch_chunks(
    state: &Arc<DownloadState>,
    file: &OutputFile,
    extra_headers: &HashMap<String, String>,
    progress: &Arc<dyn ProgressSink>,
    policy: &RetryPolicy,
) -> Result<()> {
    let incomplete: Vec<usize> = state
        .chunks
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_complete())
        .map(|(i, _)| i)
        .collect();
    if incomplete.is_empty() {
        return Ok(());
    }

    let mut multi = Multi::new();
    multi
        .set_max_connects(http::POOL_CONNECTION_CACHE)
        .context("curl multi cache size")?;
    multi
        .set_max_host_connections(http::POOL_CONNECTION_CACHE)
        .context("curl multi per-host limit")?;

    let mut active: Vec<(Easy2Handle<ChunkHandler>, usize, u32)> = Vec::new();
    let mut retry_after: Vec<(Instant, usize, u32)> = Vec::new();
    let mut first_error: Option<anyhow::Error> = None;

    for idx in incomplete {
        if let Some(handle) = add_transfer(&multi, state, file, extra_headers, progress, idx)? {
            active.push((handle, idx, 1));
        }
    }

    while !active.is_empty() || !retry_after.is_empty() {
        if !active.is_empty() {
            multi.perform().context("curl multi perform")?;
        }

        let mut done: Vec<(usize, Result<(), curl::Error>)> = Vec::new();
        multi.messages(|msg| {
            for (i, (handle, ..)) in active.iter().enumerate() {
                if let Some(result) = msg.result_for2(handle) {
                    done.push((i, result));
                    break;
                }
            }
        });
        done.sort_by(|a, b| b.0.cmp(&a.0));

        for (i, transfer) in done {
            let (handle, idx, attempt) = active.remove(i);
            let mut easy = multi.remove2(handle).context("curl multi remove")?;
            let code = easy.response_code().unwrap_or(0) as u32;
            let outcome = easy.get_mut().finish(code, transfer);
            let chunk_id = state.chunks[idx].id;
            match outcome {
                Ok(()) => {}
                Err(e) => match policy.decide(attempt, classify(&e)) {
                    RetryDecision::RetryAfter(delay) => {
                        tracing::debug!(
                            segment = chunk_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "segment attempt failed, retrying"
                        );
                        retry_after.push((Instant::now() + delay, idx, attempt + 1));
                    }
                    RetryDecision::NoRetry => {
                        tracing::error!(segment = chunk_id, "segment failed: {}", e);
                        if first_error.is_none() {
                            first_error =
                                Some(anyhow::Error::new(e).context(format!("segment {}", chunk_id)));
                        }
                    }
                },
            }
        }
        if first_error.is_some() {
            break;
        }

        // Re-register retries whose backoff has elapsed.
        let now = Instant::now();
        while let Some(pos) = retry_after.iter().position(|(due, ..)| *due <= now) {
            let (_, idx, attempt) = retry_after.remove(pos);
            if let Some(handle) = add_transfer(&multi, state, file, extra_headers, progress, idx)? {
                active.push((handle, idx, attempt));
            }
        }

        if !active.is_empty() {
            let timeout = next_retry_in(&retry_after)
                .map(|d| d.min(POLL_INTERVAL))
                .unwrap_or(POLL_INTERVAL);
            multi.wait(&mut [], timeout).context("curl multi wait")?;
        } else if let Some(delay) = next_retry_in(&retry_after) {
            // Nothing in flight; just sleep out the shortest backoff.
            std::thread::sleep(delay);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn next_retry_in(retry_after: &[(Instant, usize, u32)]) -> Option<Duration> {
    let now = Instant::now();
    retry_after
        .iter()
        .map(|(due, ..)| due.saturating_duration_since(now))
        .min()
}

/// Builds one ranged-GET transfer for chunk `idx` and registers it on the
/// shared multi. Returns `None` when the chunk has nothing left to fetch.
fn add_transfer(
    multi: &Multi,
    state: &Arc<DownloadState>,
    file: &OutputFile,
    extra_headers: &HashMap<String, String>,
    progress: &Arc<dyn ProgressSink>,
    idx: usize,
) -> Result<Option<Easy2Handle<ChunkHandler>>> {
    let chunk = &state.chunks[idx];
    let resume_from = chunk.start + chunk.downloaded();
    if resume_from > chunk.end {
        return Ok(None);
    }

    let handler = ChunkHandler::new(
        Arc::clone(state),
        idx,
        file.clone(),
        Arc::clone(progress),
        resume_from,
    );
    let mut easy = Easy2::new(handler);
    easy.url(&state.url).context("invalid URL")?;
    easy.useragent(http::USER_AGENT)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.http_version(HttpVersion::V11)?;
    easy.maxage_conn(http::POOL_IDLE_TIMEOUT)?;
    easy.connect_timeout(Duration::from_secs(30))?;
    easy.buffer_size(READ_BUFFER_SIZE)?;
    // Idle watchdog: abort when no bytes arrive for the cutoff interval.
    easy.low_speed_limit(1)?;
    easy.low_speed_time(http::IDLE_TIMEOUT)?;
    easy.range(&format!("{}-{}", resume_from, chunk.end))?;
    if let Some(list) = http::header_list(extra_headers)? {
        easy.http_headers(list)?;
    }

    Ok(Some(multi.add2(easy).context("curl multi add")?))
}

/// Callback state for one chunk transfer attempt.
struct ChunkHandler {
    state: Arc<DownloadState>,
    idx: usize,
    file: OutputFile,
    progress: Arc<dyn ProgressSink>,
    /// Absolute offset this attempt resumes from.
    resume_from: i64,
    /// Bytes written by this attempt.
    written: i64,
    /// Status of the in-flight response, parsed from its status line before
    /// any body bytes arrive.
    status: Option<u32>,
    /// Set when the write callback refused a non-206 body.
    refused_body: bool,
    storage_error: Option<std::io::Error>,
}

impl ChunkHandler {
    fn new(
        state: Arc<DownloadState>,
        idx: usize,
        file: OutputFile,
        progress: Arc<dyn ProgressSink>,
        resume_from: i64,
    ) -> Self {
        Self {
            state,
            idx,
            file,
            progress,
            resume_from,
            written: 0,
            status: None,
            refused_body: false,
            storage_error: None,
        }
    }

    fn chunk(&self) -> &Chunk {
        &self.state.chunks[self.idx]
    }

    /// Maps the completed transfer onto a segment outcome.
    fn finish(&mut self, code: u32, transfer: Result<(), curl::Error>) -> Result<(), SegmentError> {
        if let Some(io_err) = self.storage_error.take() {
            return Err(SegmentError::Storage(io_err));
        }
        if let Err(e) = transfer {
            if !self.refused_body {
                return Err(SegmentError::Curl(e));
            }
            // deliberate abort on a non-206 body: report by status below
        }
        match code {
            206 => {}
            // The requested range starts past the end the server knows: the
            // tail is already on disk (resume edge), nothing left to do.
            416 => return Ok(()),
            200 => return Err(SegmentError::RangeIgnored),
            other => return Err(SegmentError::Http(other)),
        }
        let expected = self.chunk().end - self.resume_from + 1;
        if self.written < expected {
            return Err(SegmentError::Short {
                expected,
                received: self.written,
            });
        }
        Ok(())
    }
}

impl Handler for ChunkHandler {
    fn header(&mut self, data: &[u8]) -> bool {
        if let Some(code) = parse_status_line(data) {
            self.status = Some(code);
        }
        true
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, WriteError> {
        if self.status != Some(206) {
            // 200 here means the server ignored the range; writing would
            // start clobbering the file from offset 0.
            self.refused_body = true;
            return Ok(0);
        }
        let offset = (self.resume_from + self.written) as u64;
        if let Err(e) = self.file.write_at(offset, data) {
            self.storage_error = Some(e);
            return Ok(0);
        }
        let n = data.len() as i64;
        self.written += n;
        self.chunk().downloaded.fetch_add(n, Ordering::Relaxed);
        self.progress.add(data.len() as u64);
        Ok(data.len())
    }
}

/// Parses `HTTP/1.1 206 Partial Content` → 206. Non-status header lines
/// return `None`.
fn parse_status_line(line: &[u8]) -> Option<u32> {
    let s = str::from_utf8(line).ok()?;
    if !s.starts_with("HTTP/") {
        return None;
    }
    s.split_whitespace().nth(1)?.parse().ok()
}
