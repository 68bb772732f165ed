//! Output filename derivation from Content-Disposition or the URL path.

/// Fallback when neither the header nor the URL yields a usable name.
const DEFAULT_FILENAME: &str = "download.bin";

/// Derives the destination filename for a download.
///
/// Prefers the `filename` parameter of `content_disposition`, falling back
/// to the last path segment of `url`, sanitized for local filesystems.
pub fn derive_filename(url: &str, content_disposition: Option<&str>) -> String {
    let candidate = content_disposition
        .and_then(content_disposition_filename)
        .filter(|s| !s.is_empty())
        .or_else(|| last_path_segment(url));

    let raw = match candidate {
        Some(c) => c,
        None => return DEFAULT_FILENAME.to_string(),
    };

    let cleaned = sanitize(&raw);
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        cleaned
    }
}

/// Extracts the `filename` parameter from a Content-Disposition value.
/// Handles both the quoted and the bare-token form.
pub fn content_disposition_filename(value: &str) -> Option<String> {
    for param in value.split(';') {
        let param = param.trim();
        let Some((name, v)) = param.split_once('=') else {
            continue;
        };
        if !name.trim().eq_ignore_ascii_case("filename") {
            continue;
        }
        let v = v.trim();
        let v = if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
            &v[1..v.len() - 1]
        } else {
            v
        };
        if !v.is_empty() {
            return Some(v.to_string());
        }
    }
    None
}

/// Last path segment of a URL, with query and fragment stripped. `None` when
/// the URL has no path (e.g. `https://example.com`) or ends in `/`.
fn last_path_segment(url: &str) -> Option<String> {
    let base = url.split(['?', '#']).next().unwrap_or(url);
    let rest = base.split_once("://").map(|(_, r)| r).unwrap_or(base);
    let (_, path) = rest.split_once('/')?;
    let seg = path.rsplit('/').next().unwrap_or("");
    if seg.is_empty() {
        None
    } else {
        Some(seg.to_string())
    }
}

/// Drops path separators, NUL, and control characters; trims surrounding
/// whitespace.
fn sanitize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '/' && *c != '\\' && !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}
