//! Google Drive share links.
//!
//! Drive serves small files directly from the `uc` export endpoint but
//! interposes an HTML confirmation page for large ones. The resolver probes
//! the export endpoint with a tiny ranged GET, captures the cookies Drive
//! sets, and if it lands on the warning page, rebuilds the confirmed
//! download URL from the form fields.

use super::{host_contains, Resolved, UrlResolver};
use crate::http;
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

static FILE_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/file/d/([A-Za-z0-9_-]+)").unwrap());
static ACTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"action="([^"]+)""#).unwrap());
static CONFIRM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"name="confirm" value="([^"]+)""#).unwrap());
static UUID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"name="uuid" value="([^"]+)""#).unwrap());

/// Host a root-relative form action resolves against.
const USERCONTENT_BASE: &str = "https://drive.usercontent.google.com";

pub struct GoogleDriveResolver {
    /// Export endpoint the probe GET hits; injectable for tests.
    export_base: String,
}

impl Default for GoogleDriveResolver {
    fn default() -> Self {
        Self {
            export_base: "https://drive.google.com/uc".to_string(),
        }
    }
}

impl GoogleDriveResolver {
    /// Resolver pointed at a different export endpoint (tests, mirrors).
    pub fn with_export_base(base: impl Into<String>) -> Self {
        Self {
            export_base: base.into(),
        }
    }
}

impl UrlResolver for GoogleDriveResolver {
    fn can_resolve(&self, url: &str) -> bool {
        host_contains(url, "drive.google.com")
    }

    fn resolve(&self, url: &str) -> Result<Resolved> {
        let Some(id) = extract_file_id(url) else {
            // No recognizable file id; leave the URL alone.
            return Ok(Resolved::plain(url));
        };
        let export_url = format!("{}?export=download&id={}", self.export_base, id);

        let page = fetch_export_page(&export_url)?;

        let mut headers = HashMap::new();
        if !page.cookies.is_empty() {
            headers.insert("Cookie".to_string(), page.cookies.join("; "));
        }

        let is_html = page
            .content_type
            .as_deref()
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false);
        if is_html {
            let body = String::from_utf8_lossy(&page.body);
            if let Some(direct) = confirm_url_from_form(&body, &id) {
                return Ok(Resolved { url: direct, headers });
            }
        }

        // Not a warning page: whatever we were redirected to is the payload.
        Ok(Resolved {
            url: page.final_url,
            headers,
        })
    }
}

struct ExportPage {
    final_url: String,
    content_type: Option<String>,
    cookies: Vec<String>,
    body: Vec<u8>,
}

/// GET against the export endpoint with `Range: bytes=0-4096` so a response
/// that is already the payload does not drain a large file. Follows
/// redirects; collects every `Set-Cookie` as `name=value`.
fn fetch_export_page(export_url: &str) -> Result<ExportPage> {
    let mut body = Vec::new();
    let mut cookies = Vec::new();

    let mut easy = http::new_easy().context("curl handle")?;
    easy.url(export_url).context("invalid export URL")?;
    easy.timeout(Duration::from_secs(30))?;
    let mut list = curl::easy::List::new();
    list.append("Range: bytes=0-4096")?;
    easy.http_headers(list)?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(line) = std::str::from_utf8(data) {
                if let Some((name, value)) = line.split_once(':') {
                    if name.trim().eq_ignore_ascii_case("set-cookie") {
                        if let Some(pair) = value.trim().split(';').next() {
                            let pair = pair.trim();
                            if !pair.is_empty() {
                                cookies.push(pair.to_string());
                            }
                        }
                    }
                }
            }
            true
        })?;
        transfer.write_function(|data| {
            body.extend_from_slice(data);
            Ok(data.len())
        })?;
        transfer.perform().context("drive export probe failed")?;
    }

    let final_url = easy
        .effective_url()?
        .unwrap_or(export_url)
        .to_string();
    let content_type = easy.content_type()?.map(str::to_string);

    Ok(ExportPage {
        final_url,
        content_type,
        cookies,
        body,
    })
}

/// File id from `/file/d/<id>` or the `id` query parameter.
fn extract_file_id(url: &str) -> Option<String> {
    if let Some(c) = FILE_ID_RE.captures(url) {
        return Some(c[1].to_string());
    }
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == "id")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
}

/// Builds the confirmed download URL from the warning-page form. Requires
/// both the form action and the hidden `confirm` token; `uuid` rides along
/// when present. A root-relative action is promoted to the usercontent
/// host, and the separator respects an action that already has a query.
fn confirm_url_from_form(body: &str, id: &str) -> Option<String> {
    let action = ACTION_RE.captures(body)?.get(1)?.as_str();
    let confirm = CONFIRM_RE.captures(body)?.get(1)?.as_str();
    let uuid = UUID_RE.captures(body).and_then(|c| c.get(1));

    let action = if action.starts_with('/') {
        format!("{}{}", USERCONTENT_BASE, action)
    } else {
        action.to_string()
    };
    let sep = if action.contains('?') { '&' } else { '?' };

    let mut out = format!(
        "{}{}id={}&export=download&confirm={}",
        action, sep, id, confirm
    );
    if let Some(uuid) = uuid {
        out.push_str("&uuid=");
        out.push_str(uuid.as_str());
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_from_path() {
        assert_eq!(
            extract_file_id("https://drive.google.com/file/d/1AbC_d-9/view?usp=sharing").as_deref(),
            Some("1AbC_d-9")
        );
    }

    #[test]
    fn file_id_from_query() {
        assert_eq!(
            extract_file_id("https://drive.google.com/open?id=xYz-42").as_deref(),
            Some("xYz-42")
        );
    }

    #[test]
    fn no_file_id() {
        assert_eq!(extract_file_id("https://drive.google.com/drive/my-drive"), None);
        assert_eq!(extract_file_id("::not a url::"), None);
    }

    #[test]
    fn confirm_url_with_relative_action() {
        let body = r#"<form action="/download" method="get">
            <input type="hidden" name="confirm" value="t_abc">
        </form>"#;
        assert_eq!(
            confirm_url_from_form(body, "FILE1").as_deref(),
            Some("https://drive.usercontent.google.com/download?id=FILE1&export=download&confirm=t_abc")
        );
    }

    #[test]
    fn confirm_url_with_absolute_action_and_query() {
        let body = r#"<form action="https://drive.usercontent.google.com/download?hl=en">
            <input type="hidden" name="confirm" value="yes">
            <input type="hidden" name="uuid" value="beef-1234">
        </form>"#;
        assert_eq!(
            confirm_url_from_form(body, "F2").as_deref(),
            Some("https://drive.usercontent.google.com/download?hl=en&id=F2&export=download&confirm=yes&uuid=beef-1234")
        );
    }

    #[test]
    fn form_without_confirm_is_ignored() {
        let body = r#"<form action="/download"></form>"#;
        assert_eq!(confirm_url_from_form(body, "F3"), None);
    }

    #[test]
    fn matches_drive_host_only() {
        let r = GoogleDriveResolver::default();
        assert!(r.can_resolve("https://drive.google.com/file/d/abc/view"));
        assert!(!r.can_resolve("https://docs.example.com/file/d/abc"));
    }
}
