//! Robots.txt handling module
//!
//! This module fetches, parses and caches robots.txt per host and answers whether a
//! URL may be crawled. Every failure along the way allows the URL.

mod cache;
mod parser;
mod rules;

pub use cache::DirectivesCache;
pub use parser::{parse, HostDirectives};
pub use rules::{PrefixList, RuleSet};

use crate::config::RobotsConfig;
use crate::crawler::PoliteFetcher;
use crate::url::{extract_host, TldList, WebUrl};
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

/// Per-host robots.txt directives with a bounded cache in front
pub struct RobotsDirectiveCache {
    config: RobotsConfig,
    fetcher: Arc<PoliteFetcher>,
    tld_list: TldList,
    cache: Mutex<DirectivesCache>,
}

impl RobotsDirectiveCache {
    pub fn new(config: RobotsConfig, fetcher: Arc<PoliteFetcher>, tld_list: TldList) -> Self {
        let cache = Mutex::new(DirectivesCache::new(config.cache_size));
        Self {
            config,
            fetcher,
            tld_list,
            cache,
        }
    }

    /// Checks if the URL may be crawled
    ///
    /// Directives for a host are fetched the first time it is seen and then served
    /// from the cache until evicted. Robots handling that is switched off, an
    /// unparsable URL, a non-200 robots.txt or one that is not `text/plain` all
    /// allow the URL.
    ///
    /// # Arguments
    ///
    /// * `web_url` - The candidate URL
    ///
    /// # Returns
    ///
    /// * `true` - If the URL is allowed
    /// * `false` - If a matching rule disallows it
    pub async fn is_allowed(&self, web_url: &WebUrl) -> bool {
        if !self.config.enabled {
            return true;
        }

        let url = match Url::parse(web_url.url()) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Cannot check robots.txt for {}: {}", web_url, e);
                return true;
            }
        };
        let Some(host) = extract_host(&url) else {
            return true;
        };
        let key = cache_key(&host, &url);

        {
            let mut cache = self.cache.lock().await;
            if let Some(directives) = cache.get(&key) {
                tracing::trace!(
                    "Using robots.txt for {} fetched at {}",
                    key,
                    directives.fetched_at()
                );
                return directives.allows(url.path());
            }
        }

        let directives = self.fetch_directives(&host, &url).await;
        let allowed = directives.allows(url.path());

        let mut cache = self.cache.lock().await;
        if let Some(evicted) = cache.insert(key, directives) {
            tracing::debug!("Evicted robots.txt directives for {}", evicted);
        }

        allowed
    }

    /// Number of hosts currently cached
    pub async fn cached_hosts(&self) -> usize {
        self.cache.lock().await.len()
    }

    async fn fetch_directives(&self, host: &str, url: &Url) -> HostDirectives {
        let robots_url = WebUrl::new(robots_url_for(host, url), &self.tld_list);
        let mut result = self.fetcher.fetch_header(&robots_url).await;

        if !result.status.is_ok() {
            tracing::debug!(
                "No usable robots.txt at {} ({}), allowing all",
                robots_url,
                result.status
            );
            return HostDirectives::allow_all();
        }

        match self.fetcher.fetch_content(&mut result).await {
            Ok(content) if content.is_plain_text() => {
                tracing::debug!("Fetched robots.txt from {}", robots_url);
                parse(&content.text(), &self.config.user_agent_name)
            }
            Ok(content) => {
                tracing::debug!(
                    "robots.txt at {} has content type {:?}, allowing all",
                    robots_url,
                    content.content_type
                );
                HostDirectives::allow_all()
            }
            Err(e) => {
                tracing::debug!("Failed to read robots.txt at {}: {}", robots_url, e);
                HostDirectives::allow_all()
            }
        }
    }
}

/// robots.txt location for a URL's host, always over plain http
///
/// The port is kept only when it is not the default port of the URL's scheme.
pub fn robots_url_for(host: &str, url: &Url) -> String {
    match url.port() {
        Some(port) => format!("http://{}:{}/robots.txt", host, port),
        None => format!("http://{}/robots.txt", host),
    }
}

fn cache_key(host: &str, url: &Url) -> String {
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}
