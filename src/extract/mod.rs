//! HTML extraction: page text, discovered links and a small structured
//! payload.
//!
//! Extraction never fails a page: scraper parses leniently, and a page
//! with nothing extractable just yields empty data.

use crate::url::{canonicalize, ScopePolicy};
use scraper::{ElementRef, Html, Selector};
use serde_json::json;
use url::Url;

/// A link discovered on a page, canonicalised against the page URL.
#[derive(Debug, Clone)]
pub struct DiscoveredLink {
    pub url: Url,
    /// The raw rel attribute, if present
    pub rel: Option<String>,
    pub nofollow: bool,
    /// Within the crawl's allowed root domains
    pub is_internal: bool,
}

/// Everything the crawl core needs from one page.
#[derive(Debug, Clone)]
pub struct PageData {
    pub title: Option<String>,
    /// Visible text with script/style stripped; what dedup fingerprints
    pub text: String,
    pub links: Vec<DiscoveredLink>,
    /// Structured extraction output, opaque to the core
    pub payload: serde_json::Value,
}

/// The extraction seam. Implementations must be infallible at the page
/// level; partial data beats no data.
pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str, base_url: &Url) -> PageData;
}

/// Default scraper-based extractor.
///
/// Links are classified internal/external against the crawl's scope
/// policy (the same one the frontier admits against), not against the
/// referring page's host: a link between two sibling subdomains of an
/// allowed root is internal.
pub struct HtmlExtractor {
    scope: ScopePolicy,
}

impl HtmlExtractor {
    pub fn new(scope: ScopePolicy) -> Self {
        Self { scope }
    }
}

impl Extractor for HtmlExtractor {
    fn extract(&self, html: &str, base_url: &Url) -> PageData {
        let document = Html::parse_document(html);

        let title = extract_title(&document);
        let description = extract_meta_description(&document);
        let lang = extract_lang(&document);
        let links = extract_links(&document, base_url, &self.scope);
        let text = extract_text(&document);

        let payload = json!({
            "title": title,
            "description": description,
            "lang": lang,
            "link_count": links.len(),
        });

        PageData {
            title,
            text,
            links,
            payload,
        }
    }
}

fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_meta_description(document: &Html) -> Option<String> {
    let selector = Selector::parse("meta[name='description']").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn extract_lang(document: &Html) -> Option<String> {
    let selector = Selector::parse("html").ok()?;
    document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr("lang"))
        .map(|s| s.to_string())
}

/// Collects anchor and canonical links, canonicalised against the page
/// URL. Unsupported schemes, fragment-only hrefs and download links are
/// dropped here.
fn extract_links(document: &Html, base_url: &Url, scope: &ScopePolicy) -> Vec<DiscoveredLink> {
    let mut links = Vec::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if href.trim().is_empty() || href.trim_start().starts_with('#') {
                continue;
            }

            let Ok(url) = canonicalize(href, Some(base_url)) else {
                continue;
            };

            let rel = element.value().attr("rel").map(|r| r.to_string());
            let nofollow = rel
                .as_deref()
                .is_some_and(|r| r.split_whitespace().any(|token| token.eq_ignore_ascii_case("nofollow")));

            links.push(DiscoveredLink {
                is_internal: scope.is_internal(&url),
                url,
                rel,
                nofollow,
            });
        }
    }

    if let Ok(selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&selector) {
            if let Some(href) = element.value().attr("href") {
                if let Ok(url) = canonicalize(href, Some(base_url)) {
                    links.push(DiscoveredLink {
                        is_internal: scope.is_internal(&url),
                        url,
                        rel: Some("canonical".to_string()),
                        nofollow: false,
                    });
                }
            }
        }
    }

    links
}

/// Visible document text, skipping script/style/head subtrees.
fn extract_text(document: &Html) -> String {
    let mut out = String::new();
    collect_text(document.root_element(), &mut out);
    out.trim_end().to_string()
}

fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(el) = ElementRef::wrap(child) {
            if matches!(
                el.value().name(),
                "script" | "style" | "noscript" | "template" | "head"
            ) {
                continue;
            }
            collect_text(el, out);
        } else if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                out.push_str(trimmed);
                out.push(' ');
            }
        }
    }
}
