use std::time::Duration;

/// High-level classification of a segment error for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No bytes arrived before the idle cutoff; the transfer was cancelled.
    Timeout,
    /// Network-level failure (connect, reset, DNS, short transfer).
    Connection,
    /// Unexpected HTTP status (5xx, odd 4xx).
    Http,
    /// Ranged GET answered with 200.
    RangeIgnored,
    /// Not worth retrying (disk errors).
    Fatal,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Linear backoff: after failed attempt `i` (1-based), wait `i × step`.
/// With the defaults that is 1s, 2s, 3s, 4s across five attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Backoff unit; attempt `i` waits `i × step` after failing.
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_step: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// `attempt` is 1-based (1 = first attempt just failed).
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if kind == ErrorKind::Fatal || attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.backoff_step.saturating_mul(attempt))
    }
}
