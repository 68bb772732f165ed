//! Share-link resolvers: rewrite known cloud-drive URLs into directly
//! fetchable ones, optionally supplying request headers (cookies).
//!
//! The registry tries resolvers in fixed order and returns the first match;
//! an unrecognized URL passes through unchanged. Resolver failures are
//! non-fatal — the orchestrator logs them and falls back to the input URL.

mod gdrive;
mod onedrive;

pub use gdrive::GoogleDriveResolver;
pub use onedrive::OneDriveResolver;

use anyhow::Result;
use std::collections::HashMap;

/// A directly fetchable URL plus any headers the origin requires.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub url: String,
    pub headers: HashMap<String, String>,
}

impl Resolved {
    /// A resolution that changed nothing but the URL (possibly not even
    /// that) and needs no headers.
    pub fn plain(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
        }
    }
}

/// A capability pair: recognize a URL, then rewrite it.
pub trait UrlResolver: Send + Sync {
    fn can_resolve(&self, url: &str) -> bool;
    fn resolve(&self, url: &str) -> Result<Resolved>;
}

/// Ordered resolver list; first match wins.
pub struct ResolverRegistry {
    resolvers: Vec<Box<dyn UrlResolver>>,
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self {
            resolvers: vec![
                Box::new(GoogleDriveResolver::default()),
                Box::new(OneDriveResolver),
            ],
        }
    }
}

impl ResolverRegistry {
    pub fn resolve(&self, url: &str) -> Result<Resolved> {
        for r in &self.resolvers {
            if r.can_resolve(url) {
                return r.resolve(url);
            }
        }
        Ok(Resolved::plain(url))
    }
}

/// True when `url` parses and its host contains `needle`.
pub(crate) fn host_contains(url: &str, needle: &str) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.contains(needle)))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_url_passes_through() {
        let reg = ResolverRegistry::default();
        let r = reg.resolve("https://cdn.example.com/file.iso").unwrap();
        assert_eq!(r.url, "https://cdn.example.com/file.iso");
        assert!(r.headers.is_empty());
    }

    #[test]
    fn host_matching() {
        assert!(host_contains("https://drive.google.com/file/d/x", "drive.google.com"));
        assert!(host_contains("https://onedrive.live.com/?id=1", "onedrive.live.com"));
        assert!(!host_contains("https://example.com/drive.google.com", "drive.google.com"));
        assert!(!host_contains("not a url", "drive.google.com"));
    }
}
