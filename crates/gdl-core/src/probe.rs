//! HTTP HEAD metadata probe.
//!
//! One HEAD request answers everything planning needs: total size, whether
//! the origin honors byte ranges, and a filename hint.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::str;
use std::time::Duration;

use crate::filename;
use crate::http;

/// What the probe learned about the remote file. `size == -1` means the
/// origin sent no `Content-Length`; segmented mode cannot proceed then.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub url: String,
    pub name: String,
    pub size: i64,
    pub range_supported: bool,
}

/// Performs the HEAD request, following redirects and carrying any
/// resolver-supplied headers. Fails on any final status other than 200.
///
/// Blocking; call from `spawn_blocking` in async code.
pub fn probe(url: &str, extra_headers: &HashMap<String, String>) -> Result<FileMetadata> {
    let mut lines: Vec<String> = Vec::new();

    let mut easy = http::new_easy().context("curl handle")?;
    easy.url(url).context("invalid URL")?;
    easy.nobody(true)?;
    easy.connect_timeout(Duration::from_secs(15))?;
    easy.timeout(Duration::from_secs(30))?;
    if let Some(list) = http::header_list(extra_headers)? {
        easy.http_headers(list)?;
    }

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                lines.push(s.trim_end().to_string());
            }
            true
        })?;
        transfer.perform().context("HEAD request failed")?;
    }

    let code = easy.response_code().context("no response code")?;
    if code != 200 {
        anyhow::bail!("HEAD {} returned HTTP {}", url, code);
    }

    let parsed = parse_head_lines(&lines);
    let name = filename::derive_filename(url, parsed.content_disposition.as_deref());
    Ok(FileMetadata {
        url: url.to_string(),
        name,
        size: parsed.size,
        range_supported: parsed.range_supported,
    })
}

#[derive(Debug, Default)]
struct HeadFields {
    size: i64,
    range_supported: bool,
    content_disposition: Option<String>,
}

/// Folds collected header lines into the fields we care about. Redirect
/// responses contribute lines too; later values overwrite earlier ones so
/// the final response wins.
fn parse_head_lines(lines: &[String]) -> HeadFields {
    let mut fields = HeadFields {
        size: -1,
        ..Default::default()
    };

    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            if let Ok(n) = value.parse::<i64>() {
                fields.size = n;
            }
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            fields.range_supported = value.eq_ignore_ascii_case("bytes");
        } else if name.eq_ignore_ascii_case("content-disposition") {
            fields.content_disposition = Some(value.to_string());
        }
    }
    fields
}
