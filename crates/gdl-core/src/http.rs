//! Shared HTTP transport settings.
//!
//! The load-bearing switches live here: HTTP/2 stays off (range pooling is
//! tuned for HTTP/1.1 keep-alive) and no `Accept-Encoding` is requested, so
//! libcurl never decompresses a range body. Single-shot handles (probe,
//! resolver) come from `new_easy`; the segment engine applies the same
//! defaults to the `Easy2` handles it registers on its shared multi handle,
//! which owns the connection cache all fetchers draw from (see `fetch`).

use curl::easy::{Easy, HttpVersion, List};
use std::collections::HashMap;
use std::time::Duration;

/// Desktop browser User-Agent sent on all outbound requests.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Abort a transfer when no bytes arrive for this long.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Pooled connections older than this are not reused.
pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Connections the shared cache may keep, in total and per host.
pub const POOL_CONNECTION_CACHE: usize = 100;

/// New curl handle with the shared transport defaults applied.
///
/// Callers add per-request settings (URL, Range, extra headers, timeouts)
/// on top.
pub fn new_easy() -> Result<Easy, curl::Error> {
    let mut easy = Easy::new();
    easy.useragent(USER_AGENT)?;
    easy.follow_location(true)?;
    easy.max_redirections(10)?;
    easy.http_version(HttpVersion::V11)?;
    easy.connect_timeout(Duration::from_secs(30))?;
    Ok(easy)
}

/// Builds a curl header list from resolver-supplied headers (e.g. `Cookie`).
/// Returns `None` when there is nothing to add.
pub fn header_list(headers: &HashMap<String, String>) -> Result<Option<List>, curl::Error> {
    if headers.is_empty() {
        return Ok(None);
    }
    let mut list = List::new();
    for (k, v) in headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    Ok(Some(list))
}
