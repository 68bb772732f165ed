//! Progress seam between the engine and its caller.

/// Receives byte counts as they land on disk. Called from every fetcher on
/// every read, so implementations must be cheap (an atomic add, a channel
/// try_send). The orchestrator seeds it with the resumed byte total before
/// any fetcher starts; the running total is monotonically non-decreasing.
pub trait ProgressSink: Send + Sync {
    /// `n` more bytes of the file are on disk.
    fn add(&self, n: u64);
}

/// Sink that discards all progress. Library default and test fixture.
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn add(&self, _n: u64) {}
}
