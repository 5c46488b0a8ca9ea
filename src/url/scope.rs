use url::Url;

/// Decides which hosts the crawl is allowed to expand into.
///
/// The allowed set is either configured explicitly or derived from the
/// seed hosts. With `include_subdomains`, `blog.example.com` is in scope
/// for an allowed root of `example.com`. With `follow_external_links`,
/// every host is in scope.
#[derive(Debug, Clone)]
pub struct ScopePolicy {
    allowed: Vec<String>,
    include_subdomains: bool,
    follow_external_links: bool,
}

impl ScopePolicy {
    /// Builds a scope policy from an explicit domain list plus seed URLs.
    ///
    /// When `allowed_domains` is empty, the seed hosts form the allowed
    /// set.
    pub fn new(
        allowed_domains: &[String],
        seeds: &[Url],
        include_subdomains: bool,
        follow_external_links: bool,
    ) -> Self {
        let mut allowed: Vec<String> = if allowed_domains.is_empty() {
            seeds
                .iter()
                .filter_map(|u| u.host_str())
                .map(|h| h.to_lowercase())
                .collect()
        } else {
            allowed_domains.iter().map(|d| d.to_lowercase()).collect()
        };
        allowed.sort();
        allowed.dedup();

        Self {
            allowed,
            include_subdomains,
            follow_external_links,
        }
    }

    /// Returns true if the URL's host is within crawl scope.
    pub fn in_scope(&self, url: &Url) -> bool {
        if self.follow_external_links {
            return true;
        }

        let host = match url.host_str() {
            Some(h) => h.to_lowercase(),
            None => return false,
        };

        self.allowed
            .iter()
            .any(|root| host_matches(root, &host, self.include_subdomains))
    }

    /// Returns true if the URL's host is one of the allowed roots or a
    /// subdomain of one. Unlike [`in_scope`](Self::in_scope), this ignores
    /// `follow_external_links`: harvested links are classified internal or
    /// external against the crawl's root domains, even when the crawl is
    /// allowed to leave them.
    pub fn is_internal(&self, url: &Url) -> bool {
        let host = match url.host_str() {
            Some(h) => h.to_lowercase(),
            None => return false,
        };
        self.allowed.iter().any(|root| host_matches(root, &host, true))
    }
}

/// Checks a host against an allowed root domain.
fn host_matches(root: &str, candidate: &str, include_subdomains: bool) -> bool {
    if candidate == root {
        return true;
    }
    if include_subdomains {
        // Suffix match on a label boundary, so "notexample.com" does not
        // match "example.com".
        return candidate
            .strip_suffix(root)
            .is_some_and(|prefix| prefix.ends_with('.'));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(allowed: &[&str], subdomains: bool, external: bool) -> ScopePolicy {
        let allowed: Vec<String> = allowed.iter().map(|s| s.to_string()).collect();
        ScopePolicy::new(&allowed, &[], subdomains, external)
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_exact_host_in_scope() {
        let p = policy(&["example.com"], true, false);
        assert!(p.in_scope(&url("https://example.com/page")));
    }

    #[test]
    fn test_subdomain_in_scope() {
        let p = policy(&["example.com"], true, false);
        assert!(p.in_scope(&url("https://blog.example.com/")));
        assert!(p.in_scope(&url("https://a.b.example.com/")));
    }

    #[test]
    fn test_subdomains_excluded() {
        let p = policy(&["example.com"], false, false);
        assert!(p.in_scope(&url("https://example.com/")));
        assert!(!p.in_scope(&url("https://blog.example.com/")));
    }

    #[test]
    fn test_label_boundary() {
        let p = policy(&["example.com"], true, false);
        assert!(!p.in_scope(&url("https://notexample.com/")));
    }

    #[test]
    fn test_external_host_out_of_scope() {
        let p = policy(&["example.com"], true, false);
        assert!(!p.in_scope(&url("https://other.org/")));
    }

    #[test]
    fn test_follow_external_links_admits_everything() {
        let p = policy(&["example.com"], true, true);
        assert!(p.in_scope(&url("https://anything.net/")));
    }

    #[test]
    fn test_derived_from_seeds() {
        let seeds = vec![url("https://seeds.example.com/start")];
        let p = ScopePolicy::new(&[], &seeds, true, false);
        assert!(p.in_scope(&url("https://seeds.example.com/other")));
        assert!(!p.in_scope(&url("https://example.org/")));
    }

    #[test]
    fn test_is_internal_ignores_external_flag() {
        let p = policy(&["example.com"], true, true);
        assert!(p.is_internal(&url("https://example.com/")));
        assert!(!p.is_internal(&url("https://other.org/")));
    }
}
