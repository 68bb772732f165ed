//! OneDrive share links: direct download via the `download=1` parameter.

use super::{host_contains, Resolved, UrlResolver};
use anyhow::Result;
use url::Url;

pub struct OneDriveResolver;

impl UrlResolver for OneDriveResolver {
    fn can_resolve(&self, url: &str) -> bool {
        host_contains(url, "1drv.ms") || host_contains(url, "onedrive.live.com")
    }

    fn resolve(&self, url: &str) -> Result<Resolved> {
        let mut parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(_) => return Ok(Resolved::plain(url)),
        };

        let kept: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(k, _)| k != "download")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        {
            let mut q = parsed.query_pairs_mut();
            q.clear();
            for (k, v) in &kept {
                q.append_pair(k, v);
            }
            q.append_pair("download", "1");
        }

        Ok(Resolved::plain(parsed.to_string()))
    }
}
