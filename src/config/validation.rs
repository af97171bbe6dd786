use crate::config::types::{Config, CrawlerConfig, FetcherConfig, ProxyConfig, RobotsConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
///
/// Every failure here is fatal: the controller refuses to start on an invalid config.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_robots_config(&config.robots)?;
    if let Some(proxy) = &config.proxy {
        validate_proxy_config(proxy)?;
    }
    validate_seeds(&config.crawler.seeds)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.crawl_storage_folder.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "crawl_storage_folder is required".to_string(),
        ));
    }

    if config.politeness_delay_ms < 0 {
        return Err(ConfigError::Validation(format!(
            "politeness_delay_ms must be >= 0, got {}",
            config.politeness_delay_ms
        )));
    }

    if config.max_depth_of_crawling < -1 {
        return Err(ConfigError::Validation(format!(
            "max_depth_of_crawling must be -1 (unlimited) or >= 0, got {}",
            config.max_depth_of_crawling
        )));
    }

    if config.max_depth_of_crawling > i32::from(i16::MAX) {
        return Err(ConfigError::Validation(format!(
            "max_depth_of_crawling must be <= {}, got {}",
            i16::MAX,
            config.max_depth_of_crawling
        )));
    }

    if config.max_pages_to_fetch < -1 {
        return Err(ConfigError::Validation(format!(
            "max_pages_to_fetch must be -1 (unlimited) or >= 0, got {}",
            config.max_pages_to_fetch
        )));
    }

    if config.number_of_crawlers < 1 {
        return Err(ConfigError::Validation(
            "number_of_crawlers must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.user_agent_string.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent_string cannot be empty".to_string(),
        ));
    }

    if config.max_total_connections < 1 {
        return Err(ConfigError::Validation(
            "max_total_connections must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_robots_config(config: &RobotsConfig) -> Result<(), ConfigError> {
    if config.enabled && config.cache_size < 1 {
        return Err(ConfigError::Validation(
            "robots cache_size must be >= 1 when robots handling is enabled".to_string(),
        ));
    }

    if config.enabled && config.user_agent_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "robots user_agent_name cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    if config.host.trim().is_empty() {
        return Err(ConfigError::Validation(
            "proxy host cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Seeds must be absolute http(s) URLs
fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    for seed in seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(format!(
                "Seed URL '{}' must use http or https",
                seed
            )));
        }
    }
    Ok(())
}
