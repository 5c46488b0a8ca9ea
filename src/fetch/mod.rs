//! Fetching: the uniform result type over static and rendered paths,
//! blocked-response detection, and the HTTP client facade.

mod client;
mod render;

pub use client::{build_http_client, Fetcher};
pub use render::{needs_render, Renderer, StaticRenderer};

use reqwest::header::{HeaderMap, RETRY_AFTER, SERVER};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// How much of a body the blocked-pattern scan looks at.
const BLOCK_SCAN_CHARS: usize = 4096;

/// Body markers of captcha walls and anti-bot interstitials.
const BLOCKED_BODY_PATTERNS: &[&str] = &[
    "captcha",
    "cf-browser-verification",
    "cf-chl-bypass",
    "attention required! | cloudflare",
    "are you a robot",
    "unusual traffic from your computer",
    "access denied",
];

/// Uniform result of a page fetch, static or rendered.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
    /// URL after following redirects; what dedup and storage see.
    pub final_url: Url,
    pub latency: Duration,
    /// True when the body came from the JS renderer.
    pub rendered: bool,
    /// True when the response matches the anti-bot detector set.
    pub blocked: bool,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    /// Parsed Retry-After header, seconds form only.
    pub fn retry_after(&self) -> Option<Duration> {
        parse_retry_after(&self.headers)
    }
}

/// Errors raised before an HTTP status is available.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },
}

impl FetchError {
    /// Network-level failures are all worth a retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Timeout { .. } | FetchError::Network { .. })
    }
}

/// Detects anti-bot enforcement: blocking statuses, a 503 bearing
/// Cloudflare markers, or a captcha-looking body at any status.
pub fn is_blocked_response(status: u16, headers: &HeaderMap, body: &str) -> bool {
    match status {
        403 | 429 => true,
        503 => has_cloudflare_marker(headers) || body_looks_blocked(body),
        _ => body_looks_blocked(body),
    }
}

fn has_cloudflare_marker(headers: &HeaderMap) -> bool {
    headers
        .get(SERVER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|server| server.to_lowercase().contains("cloudflare"))
}

fn body_looks_blocked(body: &str) -> bool {
    let snippet: String = body.chars().take(BLOCK_SCAN_CHARS).collect::<String>().to_lowercase();
    BLOCKED_BODY_PATTERNS
        .iter()
        .any(|pattern| snippet.contains(pattern))
}

/// Parses a Retry-After header in its delay-seconds form. The HTTP-date
/// form is rare on rate limiters and is ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
