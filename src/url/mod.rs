//! URL handling: canonicalisation and crawl-scope policy.

mod canonical;
mod scope;

pub use canonical::canonicalize;
pub use scope::ScopePolicy;

use url::Url;

/// Extracts the lowercase host from a URL.
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}
