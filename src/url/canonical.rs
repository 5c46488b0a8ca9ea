use crate::UrlError;
use url::form_urlencoded;
use url::Url;

/// Query parameters stripped during canonicalisation, matched
/// case-insensitively. Any `utm_`-prefixed key is stripped as well.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "mc_eid", "mc_cid", "_ga", "_gl", "igshid",
];

/// Canonicalises a URL into its stable form.
///
/// Equivalent URLs map to one string, and canonicalising a canonical URL
/// yields itself. The steps, in order:
///
/// 1. Resolve relative input against `base` if present
/// 2. Reject any scheme other than `http`/`https` (`mailto:`,
///    `javascript:`, `tel:`, `data:` are filtered here)
/// 3. Lowercase the host (the `url` crate also IDNA-encodes it) and strip
///    trailing dots
/// 4. Drop the port if it is the scheme default
/// 5. Segment-normalise the path: resolve `.` and `..`, collapse duplicate
///    slashes, enforce a leading `/`
/// 6. Drop tracking query parameters and sort the remainder by key then
///    value
/// 7. Drop the fragment
///
/// # Examples
///
/// ```
/// use skimmer::url::canonicalize;
///
/// let url = canonicalize("HTTP://Example.COM:80/a//b/./c?utm_source=x&id=3&a=1#frag", None).unwrap();
/// assert_eq!(url.as_str(), "http://example.com/a/b/c?a=1&id=3");
/// ```
pub fn canonicalize(input: &str, base: Option<&Url>) -> Result<Url, UrlError> {
    let mut url = match base {
        Some(base) => base
            .join(input.trim())
            .map_err(|e| UrlError::Parse(e.to_string()))?,
        None => Url::parse(input.trim()).map_err(|e| UrlError::Parse(e.to_string()))?,
    };

    // The url crate lowercases schemes at parse time; default ports are
    // never reflected in the serialization.
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(UrlError::UnsupportedScheme(other.to_string())),
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?;
    let normalized_host = host.to_lowercase();
    let normalized_host = normalized_host.trim_end_matches('.');
    if normalized_host.is_empty() {
        return Err(UrlError::MissingHost);
    }
    if normalized_host != host {
        url.set_host(Some(normalized_host))
            .map_err(|e| UrlError::Malformed(format!("failed to set host: {}", e)))?;
    }

    let normalized_path = normalize_path(url.path());
    if normalized_path != url.path() {
        url.set_path(&normalized_path);
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let params = filter_and_sort_query(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params)
                .finish();
            url.set_query(Some(&query));
        }
    }

    Ok(url)
}

/// Resolves `.`/`..` segments and collapses duplicate slashes.
///
/// A trailing slash is preserved: `/a/b/` and `/a/b` are different
/// resources to many servers.
fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let had_trailing_slash = path.len() > 1 && path.ends_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut result = format!("/{}", segments.join("/"));
    if had_trailing_slash {
        result.push('/');
    }
    result
}

/// Drops tracking parameters and sorts the rest by (key, value).
fn filter_and_sort_query(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    params.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    params
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(input: &str) -> String {
        canonicalize(input, None).unwrap().to_string()
    }

    #[test]
    fn test_spec_literal_example() {
        assert_eq!(
            canon("HTTP://Example.COM:80/a//b/./c?utm_source=x&id=3&a=1#frag"),
            "http://example.com/a/b/c?a=1&id=3"
        );
    }

    #[test]
    fn test_idempotence() {
        let inputs = [
            "HTTP://Example.COM:80/a//b/./c?utm_source=x&id=3&a=1#frag",
            "https://example.com./path/../other?z=1&a=2",
            "https://example.com/",
            "http://example.com/a/b/?q=hello+world",
        ];
        for input in inputs {
            let once = canonicalize(input, None).unwrap();
            let twice = canonicalize(once.as_str(), None).unwrap();
            assert_eq!(once, twice, "not idempotent for {}", input);
        }
    }

    #[test]
    fn test_lowercase_scheme_and_host() {
        assert_eq!(canon("HTTPS://EXAMPLE.COM/Page"), "https://example.com/Page");
    }

    #[test]
    fn test_default_port_dropped() {
        assert_eq!(canon("http://example.com:80/"), "http://example.com/");
        assert_eq!(canon("https://example.com:443/"), "https://example.com/");
    }

    #[test]
    fn test_non_default_port_kept() {
        assert_eq!(canon("https://example.com:8443/"), "https://example.com:8443/");
    }

    #[test]
    fn test_trailing_dot_stripped() {
        assert_eq!(canon("https://example.com./page"), "https://example.com/page");
    }

    #[test]
    fn test_dot_segments_resolved() {
        assert_eq!(canon("https://example.com/a/../b/./c"), "https://example.com/b/c");
    }

    #[test]
    fn test_duplicate_slashes_collapsed() {
        assert_eq!(
            canon("https://example.com///path//to///page"),
            "https://example.com/path/to/page"
        );
    }

    #[test]
    fn test_parent_dir_at_root() {
        assert_eq!(canon("https://example.com/../page"), "https://example.com/page");
    }

    #[test]
    fn test_trailing_slash_preserved() {
        assert_eq!(canon("https://example.com/docs/"), "https://example.com/docs/");
    }

    #[test]
    fn test_fragment_removed() {
        assert_eq!(canon("https://example.com/page#section"), "https://example.com/page");
    }

    #[test]
    fn test_query_sorted_by_key_then_value() {
        assert_eq!(
            canon("https://example.com/p?b=2&a=1&b=1"),
            "https://example.com/p?a=1&b=1&b=2"
        );
    }

    #[test]
    fn test_shuffled_query_and_mixed_case_host_converge() {
        let a = canon("https://Example.com/p?b=2&a=1");
        let b = canon("https://example.COM/p?a=1&b=2");
        assert_eq!(a, b);
    }

    #[test]
    fn test_tracking_params_removed() {
        assert_eq!(
            canon("https://example.com/p?utm_source=a&fbclid=b&gclid=c&id=1"),
            "https://example.com/p?id=1"
        );
    }

    #[test]
    fn test_tracking_params_case_insensitive() {
        assert_eq!(canon("https://example.com/p?UTM_Source=a&FBCLID=b"), "https://example.com/p");
    }

    #[test]
    fn test_custom_utm_param_removed() {
        assert_eq!(canon("https://example.com/p?utm_custom=x"), "https://example.com/p");
    }

    #[test]
    fn test_empty_query_removed() {
        assert_eq!(canon("https://example.com/p?utm_source=x"), "https://example.com/p");
    }

    #[test]
    fn test_relative_resolution() {
        let base = Url::parse("https://example.com/a/b").unwrap();
        let url = canonicalize("../c", Some(&base)).unwrap();
        assert_eq!(url.as_str(), "https://example.com/c");
    }

    #[test]
    fn test_unsupported_schemes_rejected() {
        for input in ["mailto:a@example.com", "javascript:void(0)", "tel:+123", "data:text/plain,x", "ftp://example.com/f"] {
            let result = canonicalize(input, None);
            assert!(
                matches!(result, Err(UrlError::UnsupportedScheme(_))),
                "expected UnsupportedScheme for {}",
                input
            );
        }
    }

    #[test]
    fn test_unparseable_input() {
        assert!(canonicalize("not a url", None).is_err());
    }

    #[test]
    fn test_empty_path_becomes_root() {
        assert_eq!(canon("https://example.com"), "https://example.com/");
    }
}
