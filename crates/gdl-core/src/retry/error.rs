//! Segment fetch error type.

use std::fmt;

/// Error from a single segment attempt (curl failure, bad status, or disk).
/// Classified by the retry policy before being converted to anyhow.
#[derive(Debug)]
pub enum SegmentError {
    /// libcurl reported a failure (connect, idle abort, aborted transfer).
    Curl(curl::Error),
    /// Unexpected HTTP status on a ranged GET.
    Http(u32),
    /// Server answered a ranged GET with 200: streaming it would clobber the
    /// file from offset 0, so nothing was written.
    RangeIgnored,
    /// Transfer ended cleanly but short of the requested range (server
    /// closed early). Retrying resumes from the bytes that did land.
    Short { expected: i64, received: i64 },
    /// Disk write failed (full, permissions). Not retried.
    Storage(std::io::Error),
}

impl fmt::Display for SegmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentError::Curl(e) => write!(f, "{}", e),
            SegmentError::Http(code) => write!(f, "unexpected HTTP {}", code),
            SegmentError::RangeIgnored => {
                write!(f, "server ignored Range header (200 instead of 206)")
            }
            SegmentError::Short { expected, received } => {
                write!(f, "short transfer: expected {} bytes, got {}", expected, received)
            }
            SegmentError::Storage(e) => write!(f, "storage: {}", e),
        }
    }
}

impl std::error::Error for SegmentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SegmentError::Curl(e) => Some(e),
            SegmentError::Storage(e) => Some(e),
            SegmentError::Http(_) | SegmentError::RangeIgnored | SegmentError::Short { .. } => None,
        }
    }
}
