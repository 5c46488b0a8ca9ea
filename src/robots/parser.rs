//! Robots.txt parsing.
//!
//! Allow/disallow matching is delegated to the robotstxt crate (longest
//! match wins, ties go to Allow). Crawl-delay and Sitemap lines are parsed
//! here because the crate does not expose them.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Parsed robots.txt for one host.
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    /// Raw robots.txt content (empty means allow all)
    content: String,
    allow_all: bool,
    groups: Vec<AgentGroup>,
    sitemaps: Vec<String>,
}

/// One user-agent group and the crawl-delay it declares, if any.
#[derive(Debug, Clone)]
struct AgentGroup {
    agents: Vec<String>,
    crawl_delay: Option<Duration>,
}

impl RobotsPolicy {
    /// Parses raw robots.txt content.
    pub fn from_content(content: &str) -> Self {
        let mut groups: Vec<AgentGroup> = Vec::new();
        let mut sitemaps = Vec::new();
        // Consecutive user-agent lines share one group; any other
        // directive closes the agent run.
        let mut in_agent_run = false;

        for line in content.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !in_agent_run {
                        groups.push(AgentGroup {
                            agents: Vec::new(),
                            crawl_delay: None,
                        });
                        in_agent_run = true;
                    }
                    if let Some(group) = groups.last_mut() {
                        group.agents.push(value.to_lowercase());
                    }
                }
                "crawl-delay" => {
                    in_agent_run = false;
                    if let (Some(group), Ok(seconds)) = (groups.last_mut(), value.parse::<f64>()) {
                        if seconds >= 0.0 && seconds.is_finite() {
                            group.crawl_delay = Some(Duration::from_secs_f64(seconds));
                        }
                    }
                }
                "sitemap" => {
                    in_agent_run = false;
                    if !value.is_empty() {
                        sitemaps.push(value.to_string());
                    }
                }
                _ => {
                    in_agent_run = false;
                }
            }
        }

        Self {
            content: content.to_string(),
            allow_all: false,
            groups,
            sitemaps,
        }
    }

    /// A permissive policy, used when robots.txt is missing or could not
    /// be fetched.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
            groups: Vec::new(),
            sitemaps: Vec::new(),
        }
    }

    /// Checks whether a URL is allowed for the given user agent.
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Crawl-delay for the given user agent.
    ///
    /// Agent selection is longest prefix match of the user agent against
    /// the group names, with `*` as the fallback.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<Duration> {
        let ua = user_agent.to_lowercase();
        // (matched prefix length, that group's delay); the group wins even
        // when it declares no delay.
        let mut best: Option<(usize, Option<Duration>)> = None;
        let mut wildcard: Option<Duration> = None;

        for group in &self.groups {
            for agent in &group.agents {
                if agent == "*" {
                    if wildcard.is_none() {
                        wildcard = group.crawl_delay;
                    }
                } else if ua.starts_with(agent.as_str())
                    && best.map_or(true, |(len, _)| agent.len() > len)
                {
                    best = Some((agent.len(), group.crawl_delay));
                }
            }
        }

        match best {
            Some((_, delay)) => delay,
            None => wildcard,
        }
    }

    /// Sitemap URLs listed in the file.
    pub fn sitemaps(&self) -> &[String] {
        &self.sitemaps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let robots = RobotsPolicy::allow_all();
        assert!(robots.is_allowed("/any/path", "TestBot"));
        assert!(robots.is_allowed("/admin", "TestBot"));
    }

    #[test]
    fn test_disallow_all() {
        let robots = RobotsPolicy::from_content("User-agent: *\nDisallow: /");
        assert!(!robots.is_allowed("/", "TestBot"));
        assert!(!robots.is_allowed("/page", "TestBot"));
    }

    #[test]
    fn test_disallow_specific_prefix() {
        let robots = RobotsPolicy::from_content("User-agent: *\nDisallow: /private");
        assert!(robots.is_allowed("/", "TestBot"));
        assert!(robots.is_allowed("/public/page", "TestBot"));
        assert!(!robots.is_allowed("/private", "TestBot"));
        assert!(!robots.is_allowed("/private/page", "TestBot"));
    }

    #[test]
    fn test_longest_match_wins_allow_over_disallow() {
        let robots =
            RobotsPolicy::from_content("User-agent: *\nDisallow: /private\nAllow: /private/public");
        assert!(!robots.is_allowed("/private", "TestBot"));
        assert!(robots.is_allowed("/private/public", "TestBot"));
    }

    #[test]
    fn test_specific_user_agent_group() {
        let robots = RobotsPolicy::from_content(
            "User-agent: BadBot\nDisallow: /\n\nUser-agent: *\nAllow: /",
        );
        assert!(robots.is_allowed("/page", "GoodBot"));
        assert!(!robots.is_allowed("/page", "BadBot"));
    }

    #[test]
    fn test_empty_content_allows_all() {
        let robots = RobotsPolicy::from_content("");
        assert!(robots.is_allowed("/any", "TestBot"));
    }

    #[test]
    fn test_garbage_content_allows_all() {
        let robots = RobotsPolicy::from_content("This is not valid robots.txt {{{");
        assert!(robots.is_allowed("/any/path", "TestBot"));
    }

    #[test]
    fn test_crawl_delay_wildcard() {
        let robots = RobotsPolicy::from_content("User-agent: *\nCrawl-delay: 5\nDisallow: /admin");
        assert_eq!(robots.crawl_delay("TestBot"), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_crawl_delay_fractional() {
        let robots = RobotsPolicy::from_content("User-agent: *\nCrawl-delay: 0.5");
        assert_eq!(robots.crawl_delay("TestBot"), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_crawl_delay_per_agent_longest_prefix() {
        let robots = RobotsPolicy::from_content(
            "User-agent: Test\nCrawl-delay: 2\n\nUser-agent: TestBot\nCrawl-delay: 10\n\nUser-agent: *\nCrawl-delay: 1",
        );
        // "TestBot/1.0" prefix-matches both "test" and "testbot"; the
        // longer one wins.
        assert_eq!(robots.crawl_delay("TestBot/1.0"), Some(Duration::from_secs(10)));
        assert_eq!(robots.crawl_delay("OtherBot"), Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_crawl_delay_missing() {
        let robots = RobotsPolicy::from_content("User-agent: *\nDisallow: /admin");
        assert_eq!(robots.crawl_delay("TestBot"), None);
        assert_eq!(RobotsPolicy::allow_all().crawl_delay("TestBot"), None);
    }

    #[test]
    fn test_crawl_delay_negative_ignored() {
        let robots = RobotsPolicy::from_content("User-agent: *\nCrawl-delay: -3");
        assert_eq!(robots.crawl_delay("TestBot"), None);
    }

    #[test]
    fn test_shared_agent_run() {
        let robots = RobotsPolicy::from_content(
            "User-agent: BotA\nUser-agent: BotB\nCrawl-delay: 4\nDisallow: /x",
        );
        assert_eq!(robots.crawl_delay("BotA"), Some(Duration::from_secs(4)));
        assert_eq!(robots.crawl_delay("BotB"), Some(Duration::from_secs(4)));
        assert_eq!(robots.crawl_delay("BotC"), None);
    }

    #[test]
    fn test_sitemaps_collected() {
        let robots = RobotsPolicy::from_content(
            "Sitemap: https://example.com/sitemap.xml\nUser-agent: *\nDisallow:\nSitemap: https://example.com/news.xml",
        );
        assert_eq!(
            robots.sitemaps(),
            &[
                "https://example.com/sitemap.xml".to_string(),
                "https://example.com/news.xml".to_string()
            ]
        );
    }

    #[test]
    fn test_comments_stripped() {
        let robots =
            RobotsPolicy::from_content("User-agent: * # everyone\nCrawl-delay: 3 # seconds");
        assert_eq!(robots.crawl_delay("AnyBot"), Some(Duration::from_secs(3)));
    }
}
