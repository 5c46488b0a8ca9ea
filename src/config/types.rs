use crate::session::SessionContext;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for skimmer
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Seed URLs to start crawling from
    pub seeds: Vec<String>,

    pub crawler: CrawlerConfig,
    pub scope: ScopeConfig,
    pub politeness: PolitenessConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub dedup: DedupConfig,
    pub output: OutputConfig,
    pub session: SessionContext,
}

/// Crawl traversal strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Breadth-first: admission order wins
    Bfs,
    /// Depth-first: deeper links get higher priority
    Dfs,
    /// Seeds high, internal links normal, external links low
    Hybrid,
}

/// How page bodies are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Plain HTTP fetch only
    Static,
    /// Always go through the JS renderer
    Javascript,
    /// Static first, renderer when the static body looks empty
    Auto,
}

/// Crawl bounds and traversal behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum depth from the seed URLs
    pub max_depth: u32,

    /// Hard cap on successfully crawled pages
    pub max_pages: u64,

    /// Number of concurrent workers
    pub workers: usize,

    pub strategy: Strategy,

    pub render_mode: RenderMode,

    /// Transient failures are re-admitted up to this many times
    pub max_retries: u32,

    /// Redirect chain cap per fetch
    pub max_redirects: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_pages: 1000,
            workers: 4,
            strategy: Strategy::Hybrid,
            render_mode: RenderMode::Auto,
            max_retries: 3,
            max_redirects: 10,
        }
    }
}

/// Which hosts the crawl may expand into
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScopeConfig {
    pub follow_external_links: bool,

    pub include_subdomains: bool,

    /// Allowed root domains; empty means "derive from seeds"
    pub allowed_domains: Vec<String>,

    /// Whether links marked rel=nofollow are admitted to the frontier
    pub follow_nofollow_links: bool,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            follow_external_links: false,
            include_subdomains: true,
            allowed_domains: Vec::new(),
            follow_nofollow_links: false,
        }
    }
}

/// Pacing, timeouts and robots behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PolitenessConfig {
    /// Floor for the per-host adaptive delay (milliseconds)
    pub min_delay_ms: u64,

    /// Ceiling for the per-host adaptive delay (milliseconds)
    pub max_delay_ms: u64,

    /// Whether outcomes adjust the per-host delay
    pub adaptive_delay: bool,

    /// Deadline for a single page fetch or render (seconds)
    pub page_timeout_secs: u64,

    pub respect_robots: bool,

    /// How long a fetched robots.txt stays fresh (seconds)
    pub robots_ttl_secs: u64,

    /// TTL for the allow-all policy cached after a robots fetch failure
    pub robots_negative_ttl_secs: u64,
}

impl Default for PolitenessConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 500,
            max_delay_ms: 5000,
            adaptive_delay: true,
            page_timeout_secs: 30,
            respect_robots: true,
            robots_ttl_secs: 3600,
            robots_negative_ttl_secs: 300,
        }
    }
}

impl PolitenessConfig {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    pub fn robots_ttl(&self) -> Duration {
        Duration::from_secs(self.robots_ttl_secs)
    }

    pub fn robots_negative_ttl(&self) -> Duration {
        Duration::from_secs(self.robots_negative_ttl_secs)
    }
}

/// Crawler identification
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// The crawler user-agent; always used for robots.txt decisions
    pub user_agent: String,

    /// Rotate a small pool of browser user-agents for page fetches
    pub rotate_user_agents: bool,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            user_agent: "skimmer/0.1 (+https://github.com/skimmer-crawler/skimmer)".to_string(),
            rotate_user_agents: true,
        }
    }
}

/// Content deduplication settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DedupConfig {
    pub enable: bool,

    /// Similarity ratio above which two texts are near-duplicates
    pub similarity_threshold: f64,

    /// Texts shorter than this are never deduplicated
    pub min_chars: usize,

    /// Capacity bound on the in-memory fingerprint store
    pub max_fingerprints: usize,

    /// Harvest links from duplicate pages even though they are not stored
    pub harvest_duplicate_links: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enable: true,
            similarity_threshold: 0.85,
            min_chars: 200,
            max_fingerprints: 100_000,
            harvest_duplicate_links: true,
        }
    }
}

/// Persistence backends
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path for the JSONL page stream; empty disables the sink
    pub jsonl_path: String,

    /// Path for the SQLite document store; empty disables it
    pub database_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            jsonl_path: "./crawl.jsonl".to_string(),
            database_path: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.crawler.max_depth, 3);
        assert_eq!(config.crawler.max_pages, 1000);
        assert_eq!(config.crawler.workers, 4);
        assert_eq!(config.crawler.strategy, Strategy::Hybrid);
        assert_eq!(config.crawler.render_mode, RenderMode::Auto);
        assert_eq!(config.crawler.max_retries, 3);
        assert!(!config.scope.follow_external_links);
        assert!(config.scope.include_subdomains);
        assert_eq!(config.politeness.min_delay(), Duration::from_millis(500));
        assert_eq!(config.politeness.max_delay(), Duration::from_millis(5000));
        assert!(config.politeness.respect_robots);
        assert_eq!(config.politeness.robots_ttl(), Duration::from_secs(3600));
        assert!(config.dedup.enable);
        assert_eq!(config.dedup.similarity_threshold, 0.85);
        assert_eq!(config.dedup.min_chars, 200);
    }

    #[test]
    fn test_minimal_toml_parses_with_defaults() {
        let config: Config = toml::from_str(r#"seeds = ["https://example.com/"]"#).unwrap();
        assert_eq!(config.seeds.len(), 1);
        assert_eq!(config.crawler.workers, 4);
        assert!(config.session.headers.is_empty());
    }

    #[test]
    fn test_kebab_case_fields() {
        let config: Config = toml::from_str(
            r#"
seeds = ["https://example.com/"]

[crawler]
max-depth = 1
max-pages = 10
strategy = "bfs"
render-mode = "static"

[politeness]
min-delay-ms = 100
respect-robots = false

[user-agent]
user-agent = "TestBot/1.0"
rotate-user-agents = false

[scope]
follow-external-links = true
"#,
        )
        .unwrap();

        assert_eq!(config.crawler.max_depth, 1);
        assert_eq!(config.crawler.strategy, Strategy::Bfs);
        assert_eq!(config.crawler.render_mode, RenderMode::Static);
        assert_eq!(config.politeness.min_delay_ms, 100);
        assert!(!config.politeness.respect_robots);
        assert_eq!(config.user_agent.user_agent, "TestBot/1.0");
        assert!(config.scope.follow_external_links);
    }
}
