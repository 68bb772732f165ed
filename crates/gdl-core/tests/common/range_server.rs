//! Minimal HTTP/1.1 server for integration tests: HEAD metadata, Range GET
//! with 206/416, keep-alive connections, and a few failure knobs (ranges
//! silently ignored, one-shot mid-body disconnect). Also serves a static
//! page with cookies for the resolver tests.
//!
//! Connections are kept open between requests so tests can observe
//! connection-cache reuse; `connection_count` tallies accepted sockets.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Clone, Default)]
pub struct RangeServerOptions {
    /// If true, GET ignores Range and always returns 200 with the full body.
    pub ignore_ranges: bool,
    /// If true, omit `Accept-Ranges: bytes` even when ranges work.
    pub hide_accept_ranges: bool,
    /// Sent verbatim on HEAD responses when set.
    pub content_disposition: Option<String>,
    /// Close the connection after this many body bytes, once.
    pub disconnect_after: Option<usize>,
    /// Receives one entry per request, e.g. `GET bytes=0-99` or `HEAD -`.
    pub request_log: Option<Arc<Mutex<Vec<String>>>>,
    /// Incremented for every accepted TCP connection when set.
    pub connection_count: Option<Arc<AtomicUsize>>,
}

/// Starts a range-capable server in a background thread serving `body`.
/// Returns the base URL (e.g. `http://127.0.0.1:12345/`). Runs until the
/// process exits.
pub fn start(body: Vec<u8>) -> String {
    start_with_options(body, RangeServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let disconnect_armed = Arc::new(AtomicBool::new(opts.disconnect_after.is_some()));
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            if let Some(count) = &opts.connection_count {
                count.fetch_add(1, Ordering::SeqCst);
            }
            let body = Arc::clone(&body);
            let opts = opts.clone();
            let armed = Arc::clone(&disconnect_armed);
            thread::spawn(move || handle(stream, &body, &opts, &armed));
        }
    });
    format!("http://127.0.0.1:{}/", port)
}

/// Serves a fixed page (any method, any path) with the given content type
/// and `Set-Cookie` headers. Used to fake the Drive confirmation page.
pub fn start_page(body: Vec<u8>, content_type: &str, cookies: Vec<String>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let content_type = content_type.to_string();
    thread::spawn(move || {
        for mut stream in listener.incoming().flatten() {
            let mut buf = [0u8; 8192];
            if stream.read(&mut buf).is_err() {
                continue;
            }
            let mut response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: {}\r\n",
                body.len(),
                content_type
            );
            for c in &cookies {
                response.push_str(&format!("Set-Cookie: {}\r\n", c));
            }
            response.push_str("\r\n");
            let _ = stream.write_all(response.as_bytes());
            let _ = stream.write_all(&body);
        }
    });
    format!("http://127.0.0.1:{}/", port)
}

/// Serves requests on one connection until the peer goes away (keep-alive).
fn handle(
    mut stream: std::net::TcpStream,
    body: &[u8],
    opts: &RangeServerOptions,
    disconnect_armed: &AtomicBool,
) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    loop {
        let mut buf = [0u8; 8192];
        let n = match stream.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => n,
            Err(_) => return,
        };
        let request = match std::str::from_utf8(&buf[..n]) {
            Ok(s) => s,
            Err(_) => return,
        };
        let (method, range) = parse_request(request);

        if let Some(log) = &opts.request_log {
            let entry = match range {
                Some((s, e)) => format!("{} bytes={}-{}", method, s, e),
                None => format!("{} -", method),
            };
            log.lock().unwrap().push(entry);
        }

        let total = body.len() as u64;
        let accept_ranges = if opts.hide_accept_ranges || opts.ignore_ranges {
            ""
        } else {
            "Accept-Ranges: bytes\r\n"
        };

        if method.eq_ignore_ascii_case("HEAD") {
            let disposition = opts
                .content_disposition
                .as_deref()
                .map(|d| format!("Content-Disposition: {}\r\n", d))
                .unwrap_or_default();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}{}\r\n",
                total, accept_ranges, disposition
            );
            if stream.write_all(response.as_bytes()).is_err() {
                return;
            }
            continue;
        }

        if method.eq_ignore_ascii_case("GET") {
            let (status, content_range, slice) = if !opts.ignore_ranges {
                if let Some((start, end_incl)) = range {
                    let end_incl = end_incl.min(total.saturating_sub(1));
                    if start > end_incl || start >= total {
                        (
                            "416 Range Not Satisfiable".to_string(),
                            format!("Content-Range: bytes */{}\r\n", total),
                            &body[0..0],
                        )
                    } else {
                        let s = start as usize;
                        let e = (end_incl + 1) as usize;
                        (
                            "206 Partial Content".to_string(),
                            format!("Content-Range: bytes {}-{}/{}\r\n", start, end_incl, total),
                            &body[s..e],
                        )
                    }
                } else {
                    ("200 OK".to_string(), String::new(), body)
                }
            } else {
                ("200 OK".to_string(), String::new(), body)
            };

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}{}\r\n",
                status,
                slice.len(),
                content_range,
                accept_ranges
            );
            if stream.write_all(response.as_bytes()).is_err() {
                return;
            }

            if let Some(cut) = opts.disconnect_after {
                if cut < slice.len() && disconnect_armed.swap(false, Ordering::SeqCst) {
                    let _ = stream.write_all(&slice[..cut]);
                    return; // drop the connection mid-body
                }
            }
            if stream.write_all(slice).is_err() {
                return;
            }
            continue;
        }

        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\n\r\n");
        return;
    }
}

/// Returns (method, optional (start, end_inclusive)) for `Range: bytes=X-Y`.
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut method = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            method = line.split_whitespace().next().unwrap_or("");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                let value = value.trim();
                if let Some(part) = value.strip_prefix("bytes=") {
                    if let Some((a, b)) = part.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end = b.trim();
                        let end_incl = if end.is_empty() {
                            u64::MAX
                        } else {
                            end.parse::<u64>().unwrap_or(0)
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, range)
}
