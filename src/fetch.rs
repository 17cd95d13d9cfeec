//! Raw-content download.
//!
//! One HTTP GET against the translated raw-content URL through the shared
//! [`reqwest::Client`].  The client carries the process-wide request timeout,
//! so a hung fetch surfaces as [`FetchError::NetworkError`].

use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};

/// How much of the body head is inspected for HTML markers.
const SNIFF_LEN: usize = 1000;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum FetchError {
    /// Non-2xx from GitHub: usually a mistyped path or a private repository.
    #[error("GitHub returned {status} for {url} (check the file path; private repositories are not reachable)")]
    NotFound { url: String, status: StatusCode },

    /// Transport failure or timeout while talking to GitHub.
    #[error("failed to fetch GitHub content: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The response was a web page, not raw file bytes.
    #[error("received HTML instead of file content; use a direct link to a raw file")]
    HtmlContent,
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

/// Download the bytes served at `url`.
///
/// Responses that look like an HTML page (by `Content-Type` or by the first
/// [`SNIFF_LEN`] bytes of the body) are rejected: they mean we were served a
/// GitHub web page rather than file content.
pub async fn fetch_raw(client: &reqwest::Client, url: &str) -> Result<Bytes, FetchError> {
    debug!(%url, "fetching raw content");

    let resp = client.get(url).send().await?;

    let status = resp.status();
    if !status.is_success() {
        warn!(%url, %status, "raw-content fetch returned non-success");
        return Err(FetchError::NotFound {
            url: url.to_string(),
            status,
        });
    }

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if content_type.starts_with("text/html") {
        warn!(%url, %content_type, "received HTML content type instead of raw file");
        return Err(FetchError::HtmlContent);
    }

    let bytes = resp.bytes().await?;

    if looks_like_html(&bytes) {
        warn!(%url, "response body appears to be HTML");
        return Err(FetchError::HtmlContent);
    }

    debug!(%url, bytes = bytes.len(), "raw content fetched");
    Ok(bytes)
}

/// Inspect the head of the body for HTML document markers.
fn looks_like_html(body: &[u8]) -> bool {
    let head = &body[..body.len().min(SNIFF_LEN)];
    let head = String::from_utf8_lossy(head);
    head.contains("<!DOCTYPE html>") || head.contains("<html")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
