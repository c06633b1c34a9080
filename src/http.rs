use reqwest::{
    Client,
    header::{CONTENT_DISPOSITION, CONTENT_LENGTH, RANGE},
};
use std::time::Duration;
use tracing::{debug, instrument, trace};

use crate::error::{DownloadError, Result};

/// Result of probing a remote resource: its total size and the filename to save it
/// under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub content_length: u64,
    pub filename: String,
}

/// Builds a `reqwest::Client` with TLS verification disabled and the timeouts the
/// fetcher needs (connect/handshake/first-header 5s, keep-alive 30s). Deliberately no
/// `.timeout(...)`: that caps the *whole* request including body streaming, and parts
/// can legitimately take much longer than 5s to fully arrive over a rate-limited
/// proxy. `read_timeout` instead bounds the gap between individual reads (including
/// the first response header), matching the per-step deadline the fetcher needs
/// without imposing a global one. TLS verification is disabled throughout the core by
/// design: the tool is meant to use untrusted intermediaries, which frequently present
/// mismatched certificates.
pub fn client_builder() -> reqwest::ClientBuilder {
    Client::builder()
        .danger_accept_invalid_certs(true)
        .connect_timeout(Duration::from_secs(5))
        .read_timeout(Duration::from_secs(5))
        .pool_idle_timeout(Duration::from_secs(30))
}

/// Probes `url` (optionally through `proxy`) to determine `(content_length,
/// filename)`.
///
/// 1. HEAD; if 2xx with a parseable non-negative `Content-Length`, take it.
///    Filename comes from `Content-Disposition`'s `filename=`, else the URL's last
///    path segment, else the literal `downloaded_file`.
/// 2. If HEAD succeeded but Content-Length was absent or zero, GET with
///    `Range: bytes=999999999999-`; expect 416 with `Content-Range: bytes */<total>`.
/// 3. Anything else fails with `ProbeFailed`.
#[instrument(skip(client), fields(url = %url))]
pub async fn probe(client: &Client, url: &str) -> Result<ProbeResult> {
    debug!("Sending HEAD request");
    let head = client.head(url).send().await;

    if let Ok(resp) = head {
        trace!(status = %resp.status(), "HEAD response received");
        if resp.status().is_success() {
            let filename = filename_from(resp.headers().get(CONTENT_DISPOSITION), url);
            let len = resp
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());

            if let Some(content_length) = len.filter(|&n| n > 0) {
                debug!(content_length, %filename, "HEAD probe successful");
                return Ok(ProbeResult { content_length, filename });
            }

            debug!("HEAD had no usable Content-Length, falling back to range overflow probe");
            let total = range_overflow_probe(client, url).await?;
            return Ok(ProbeResult { content_length: total, filename });
        }
    }

    debug!("HEAD failed or was not 2xx, falling back to range overflow probe");
    let total = range_overflow_probe(client, url).await?;
    let filename = filename_from(None, url);
    Ok(ProbeResult { content_length: total, filename })
}

/// GET with `Range: bytes=999999999999-`; a compliant server responds 416 with
/// `Content-Range: bytes */<total>` since no file reaches that offset.
async fn range_overflow_probe(client: &Client, url: &str) -> Result<u64> {
    let resp = client
        .get(url)
        .header(RANGE, "bytes=999999999999-")
        .send()
        .await?;

    if resp.status().as_u16() != 416 {
        return Err(DownloadError::ProbeFailed(format!(
            "expected 416 Range Not Satisfiable, got {}",
            resp.status()
        )));
    }

    let content_range = resp
        .headers()
        .get("content-range")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            DownloadError::ProbeFailed("416 response had no Content-Range header".to_string())
        })?;

    parse_total_from_content_range(content_range).ok_or_else(|| {
        DownloadError::ProbeFailed(format!(
            "could not parse total size from Content-Range: {content_range:?}"
        ))
    })
}

/// Parses `bytes */<total>` out of a `Content-Range` header value.
fn parse_total_from_content_range(s: &str) -> Option<u64> {
    let slash = s.rfind('/')?;
    let total_str = s[slash + 1..].trim();
    if total_str == "*" {
        return None;
    }
    total_str.parse().ok()
}

/// `filename=` out of `Content-Disposition`, stripped of surrounding quotes; falling
/// back to the URL's last path segment, then the literal `downloaded_file`.
fn filename_from(content_disposition: Option<&reqwest::header::HeaderValue>, url: &str) -> String {
    if let Some(value) = content_disposition.and_then(|v| v.to_str().ok()) {
        if let Some(name) = parse_content_disposition_filename(value) {
            return name;
        }
    }

    if let Ok(parsed) = url::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }

    "downloaded_file".to_string()
}

fn parse_content_disposition_filename(value: &str) -> Option<String> {
    for field in value.split(';') {
        let field = field.trim();
        if let Some(rest) = field.strip_prefix("filename=") {
            return Some(rest.trim_matches('"').to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_total_parses() {
        assert_eq!(
            parse_total_from_content_range("bytes */1048576"),
            Some(1_048_576)
        );
    }

    #[test]
    fn content_range_total_unknown_is_none() {
        assert_eq!(parse_total_from_content_range("bytes */*"), None);
    }

    #[test]
    fn content_range_garbage_is_none() {
        assert_eq!(parse_total_from_content_range("garbage"), None);
    }

    #[test]
    fn content_disposition_filename_is_stripped_of_quotes() {
        assert_eq!(
            parse_content_disposition_filename(r#"attachment; filename="movie.mp4""#),
            Some("movie.mp4".to_string())
        );
    }

    #[test]
    fn content_disposition_without_filename_is_none() {
        assert_eq!(parse_content_disposition_filename("attachment"), None);
    }

    #[test]
    fn filename_falls_back_to_url_last_segment() {
        assert_eq!(
            filename_from(None, "https://example.com/files/movie.mp4"),
            "movie.mp4"
        );
    }

    #[test]
    fn filename_falls_back_to_literal_when_url_has_no_segment() {
        assert_eq!(filename_from(None, "https://example.com/"), "downloaded_file");
    }
}
