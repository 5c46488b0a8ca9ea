//! Per-host robots.txt cache with TTL and single-flight fetching.

use crate::config::PolitenessConfig;
use crate::robots::RobotsPolicy;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tokio::time::Instant;
use url::Url;

/// Deadline for a robots.txt fetch; deliberately shorter than the page
/// timeout so a slow robots endpoint cannot stall a worker for long.
const ROBOTS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// A robots policy together with its cache lifetime.
#[derive(Debug, Clone)]
pub struct CachedPolicy {
    pub policy: RobotsPolicy,
    pub fetched_at: Instant,
    pub expires_at: Instant,
}

impl CachedPolicy {
    fn new(policy: RobotsPolicy, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            policy,
            fetched_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

type Slot = Arc<OnceCell<Arc<CachedPolicy>>>;

/// Caches parsed robots.txt per `scheme://host[:port]`.
///
/// Concurrent queries for an uncached host collapse into a single fetch:
/// the slot is a `OnceCell` whose init future runs once while followers
/// await it. Cache hits never touch the fetch path.
pub struct RobotsCache {
    client: Client,
    user_agent: String,
    ttl: Duration,
    negative_ttl: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl RobotsCache {
    pub fn new(client: Client, user_agent: String, politeness: &PolitenessConfig) -> Self {
        Self {
            client,
            user_agent,
            ttl: politeness.robots_ttl(),
            negative_ttl: politeness.robots_negative_ttl(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached policy for the URL's host, fetching it on first
    /// use or after TTL expiry.
    pub async fn policy_for(&self, url: &Url) -> Arc<CachedPolicy> {
        let key = robots_key(url);

        let cell: Slot = {
            let mut slots = self.slots.lock().await;
            let slot = slots.entry(key.clone()).or_insert_with(Default::default);
            if slot.get().is_some_and(|cached| cached.is_expired()) {
                *slot = Slot::default();
            }
            slot.clone()
        };

        cell.get_or_init(|| self.fetch_policy(&key)).await.clone()
    }

    /// Checks whether the URL is allowed for the configured crawler
    /// user-agent.
    pub async fn allowed(&self, url: &Url) -> bool {
        self.policy_for(url)
            .await
            .policy
            .is_allowed(url.as_str(), &self.user_agent)
    }

    /// Crawl-delay advertised for the configured crawler user-agent.
    pub async fn crawl_delay(&self, url: &Url) -> Option<Duration> {
        self.policy_for(url).await.policy.crawl_delay(&self.user_agent)
    }

    /// Sitemap URLs advertised by the URL's host.
    pub async fn sitemaps(&self, url: &Url) -> Vec<String> {
        self.policy_for(url).await.policy.sitemaps().to_vec()
    }

    async fn fetch_policy(&self, key: &str) -> Arc<CachedPolicy> {
        let robots_url = format!("{}/robots.txt", key);
        tracing::debug!(url = %robots_url, "fetching robots.txt");

        let response = self
            .client
            .get(&robots_url)
            .timeout(ROBOTS_FETCH_TIMEOUT)
            .send()
            .await;

        let cached = match response {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => CachedPolicy::new(RobotsPolicy::from_content(&body), self.ttl),
                Err(e) => {
                    tracing::warn!(url = %robots_url, error = %e, "failed to read robots.txt body");
                    CachedPolicy::new(RobotsPolicy::allow_all(), self.negative_ttl)
                }
            },
            // Missing robots.txt is a definitive answer: allow all for the
            // full TTL.
            Ok(resp) if resp.status().is_client_error() => {
                CachedPolicy::new(RobotsPolicy::allow_all(), self.ttl)
            }
            Ok(resp) => {
                tracing::warn!(url = %robots_url, status = %resp.status(), "robots.txt fetch failed");
                CachedPolicy::new(RobotsPolicy::allow_all(), self.negative_ttl)
            }
            Err(e) => {
                tracing::warn!(url = %robots_url, error = %e, "robots.txt fetch failed");
                CachedPolicy::new(RobotsPolicy::allow_all(), self.negative_ttl)
            }
        };

        Arc::new(cached)
    }
}

/// Cache key and robots.txt base for a URL: `scheme://host[:port]`.
fn robots_key(url: &Url) -> String {
    let mut key = format!("{}://", url.scheme());
    if let Some(host) = url.host_str() {
        key.push_str(host);
    }
    if let Some(port) = url.port() {
        key.push_str(&format!(":{}", port));
    }
    key
}
