//! Retry discipline for segment fetches.
//!
//! Errors are classified before conversion to `anyhow` so the policy can
//! tell a retryable transport failure from a fatal disk error, and the
//! backoff schedule lives in one place. The transfer engine consults
//! [`RetryPolicy::decide`] between attempts and schedules the re-try itself.

mod classify;
mod error;
mod policy;

pub use classify::{classify, classify_curl_error};
pub use error::SegmentError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
