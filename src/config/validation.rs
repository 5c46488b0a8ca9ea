use crate::config::types::Config;
use crate::url::canonicalize;
use crate::ConfigError;

/// Validates the entire configuration.
///
/// Seeds may be empty here; the CLI can supply them, and the engine
/// rejects a crawl with no seeds at setup time.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler(config)?;
    validate_politeness(config)?;
    validate_user_agent(config)?;
    validate_dedup(config)?;
    validate_output(config)?;
    validate_seeds(config)?;
    Ok(())
}

fn validate_crawler(config: &Config) -> Result<(), ConfigError> {
    let crawler = &config.crawler;

    if crawler.workers < 1 || crawler.workers > 100 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 100, got {}",
            crawler.workers
        )));
    }

    if crawler.max_redirects == 0 {
        return Err(ConfigError::Validation(
            "max-redirects must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_politeness(config: &Config) -> Result<(), ConfigError> {
    let politeness = &config.politeness;

    if politeness.max_delay_ms < politeness.min_delay_ms {
        return Err(ConfigError::Validation(format!(
            "max-delay-ms ({}) must be >= min-delay-ms ({})",
            politeness.max_delay_ms, politeness.min_delay_ms
        )));
    }

    if politeness.min_delay_ms < 50 {
        return Err(ConfigError::Validation(format!(
            "min-delay-ms must be >= 50ms, got {}ms",
            politeness.min_delay_ms
        )));
    }

    if politeness.page_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "page-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_user_agent(config: &Config) -> Result<(), ConfigError> {
    if config.user_agent.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_dedup(config: &Config) -> Result<(), ConfigError> {
    let dedup = &config.dedup;

    if dedup.enable && !(dedup.similarity_threshold > 0.5 && dedup.similarity_threshold <= 1.0) {
        return Err(ConfigError::Validation(format!(
            "similarity-threshold must be in (0.5, 1.0], got {}",
            dedup.similarity_threshold
        )));
    }

    Ok(())
}

fn validate_output(config: &Config) -> Result<(), ConfigError> {
    if config.output.jsonl_path.is_empty() && config.output.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "at least one output backend (jsonl-path or database-path) must be configured"
                .to_string(),
        ));
    }
    Ok(())
}

fn validate_seeds(config: &Config) -> Result<(), ConfigError> {
    for seed in &config.seeds {
        canonicalize(seed, None)
            .map_err(|e| ConfigError::InvalidSeed(format!("{}: {}", seed, e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::Config;

    fn base_config() -> Config {
        let mut config = Config::default();
        config.seeds = vec!["https://example.com/".to_string()];
        config
    }

    #[test]
    fn test_valid_default_config() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = base_config();
        config.crawler.workers = 0;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_too_many_workers_rejected() {
        let mut config = base_config();
        config.crawler.workers = 101;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_max_pages_zero_is_valid() {
        let mut config = base_config();
        config.crawler.max_pages = 0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_delay_ordering_enforced() {
        let mut config = base_config();
        config.politeness.min_delay_ms = 6000;
        config.politeness.max_delay_ms = 5000;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_user_agent_rejected() {
        let mut config = base_config();
        config.user_agent.user_agent = "  ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_similarity_threshold_bounds() {
        let mut config = base_config();
        config.dedup.similarity_threshold = 0.3;
        assert!(validate(&config).is_err());

        config.dedup.similarity_threshold = 1.0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_similarity_ignored_when_dedup_disabled() {
        let mut config = base_config();
        config.dedup.enable = false;
        config.dedup.similarity_threshold = 0.0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_no_output_backend_rejected() {
        let mut config = base_config();
        config.output.jsonl_path = String::new();
        config.output.database_path = String::new();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_seed_rejected() {
        let mut config = base_config();
        config.seeds.push("mailto:admin@example.com".to_string());
        assert!(matches!(validate(&config), Err(ConfigError::InvalidSeed(_))));
    }
}
