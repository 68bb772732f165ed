//! Map segment errors onto retry error kinds.

use super::error::SegmentError;
use super::policy::ErrorKind;

/// Classify a curl error. The idle watchdog surfaces as an operation
/// timeout; everything else transport-shaped counts as a connection
/// failure and is retried.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    ErrorKind::Connection
}

pub fn classify(e: &SegmentError) -> ErrorKind {
    match e {
        SegmentError::Curl(ce) => classify_curl_error(ce),
        SegmentError::Http(_) => ErrorKind::Http,
        SegmentError::RangeIgnored => ErrorKind::RangeIgnored,
        SegmentError::Short { .. } => ErrorKind::Connection,
        SegmentError::Storage(_) => ErrorKind::Fatal,
    }
}
