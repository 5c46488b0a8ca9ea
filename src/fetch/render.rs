//! The renderer seam: a black-box contract over JS rendering backends,
//! and the heuristic deciding when auto mode falls back to it.

use crate::fetch::{FetchError, FetchResult, Fetcher};
use crate::session::SessionContext;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use scraper::{Html, Selector};
use std::sync::Arc;
use url::Url;

/// Bodies smaller than this are assumed to be JS shells.
const MIN_STATIC_BODY_BYTES: usize = 1024;

/// Minimum extractable text for a page to count as meaningful DOM.
const MIN_MEANINGFUL_TEXT_CHARS: usize = 64;

/// A rendering backend satisfying the same contract as the static
/// fetcher. The playwright-style JS renderer is an external collaborator
/// implementing this trait.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, url: &Url, session: &SessionContext)
        -> Result<FetchResult, FetchError>;
}

/// Renderer variant that just re-runs the static fetch. Used when
/// `render-mode = "javascript"` is configured without a JS backend
/// plugged in.
pub struct StaticRenderer {
    fetcher: Arc<Fetcher>,
}

impl StaticRenderer {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Renderer for StaticRenderer {
    async fn render(
        &self,
        url: &Url,
        session: &SessionContext,
    ) -> Result<FetchResult, FetchError> {
        let mut result = self.fetcher.fetch(url, session).await?;
        result.rendered = true;
        Ok(result)
    }
}

/// Decides whether a static fetch looks like it needs the JS renderer:
/// an HTML response whose body is under the size floor, has no anchor
/// links, or carries no meaningful text.
pub fn needs_render(result: &FetchResult) -> bool {
    if !result.is_success() {
        return false;
    }

    let is_html = result
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(true, |ct| ct.contains("text/html"));
    if !is_html {
        return false;
    }

    if result.body.len() < MIN_STATIC_BODY_BYTES {
        return true;
    }

    let document = Html::parse_document(&result.body);
    if let Ok(anchor_selector) = Selector::parse("a[href]") {
        if document.select(&anchor_selector).next().is_none() {
            return true;
        }
    }

    let text_len: usize = document
        .root_element()
        .text()
        .map(|t| t.trim().len())
        .sum();
    text_len < MIN_MEANINGFUL_TEXT_CHARS
}
