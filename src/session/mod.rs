//! Read-only session context applied to every fetch.

use serde::Deserialize;
use std::collections::BTreeMap;

/// Cookies, extra headers and an optional bearer token, passed as a
/// snapshot to the fetcher. The engine never holds mutable session state.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionContext {
    /// Extra request headers, applied verbatim
    pub headers: BTreeMap<String, String>,

    /// Cookie name/value pairs, joined into a single Cookie header
    pub cookies: BTreeMap<String, String>,

    /// Sent as `Authorization: Bearer <token>` when present
    pub bearer_token: Option<String>,
}

impl SessionContext {
    /// Renders the cookie pairs as a single Cookie header value.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}
