use crate::url::TldList;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for a crawl
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// Optional outbound proxy
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,

    #[serde(default)]
    pub robots: RobotsConfig,

    /// Public suffixes used to split domain and subdomain, loaded from
    /// `crawler.tld-list-path` rather than read from TOML
    #[serde(skip)]
    pub tld_list: TldList,
}

impl Config {
    /// Creates a configuration with defaults everywhere except the storage folder
    pub fn with_storage_folder(folder: impl Into<PathBuf>) -> Self {
        Self {
            crawler: CrawlerConfig {
                crawl_storage_folder: folder.into(),
                ..CrawlerConfig::default()
            },
            ..Self::default()
        }
    }
}

/// Crawl engine behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Root folder of all durable crawl state
    #[serde(rename = "crawl-storage-folder")]
    pub crawl_storage_folder: PathBuf,

    /// Maximum link depth from the seeds, -1 for unlimited
    #[serde(rename = "max-depth-of-crawling")]
    pub max_depth_of_crawling: i32,

    /// Maximum number of pages admitted to the frontier, -1 for unlimited
    #[serde(rename = "max-pages-to-fetch")]
    pub max_pages_to_fetch: i64,

    /// Minimum gap between any two outbound requests (milliseconds)
    #[serde(rename = "politeness-delay-ms")]
    pub politeness_delay_ms: i64,

    #[serde(rename = "include-https-pages")]
    pub include_https_pages: bool,

    /// Whether image/audio/video/application bodies are handed to visitors
    #[serde(rename = "include-binary-content")]
    pub include_binary_content: bool,

    #[serde(rename = "max-outgoing-links-per-page")]
    pub max_outgoing_links_per_page: usize,

    #[serde(rename = "follow-redirects")]
    pub follow_redirects: bool,

    /// Keep the frontier and id registry of a previous run instead of wiping them
    #[serde(rename = "resumable-crawling")]
    pub resumable_crawling: bool,

    /// Number of concurrent crawl workers
    #[serde(rename = "number-of-crawlers")]
    pub number_of_crawlers: usize,

    /// Quiescence monitor poll interval (milliseconds)
    #[serde(rename = "monitor-interval-ms")]
    pub monitor_interval_ms: u64,

    /// Wait between signalling workers to stop and closing resources (milliseconds)
    #[serde(rename = "cleanup-grace-ms")]
    pub cleanup_grace_ms: u64,

    /// File with one public suffix per line
    #[serde(rename = "tld-list-path")]
    pub tld_list_path: Option<PathBuf>,

    pub seeds: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            crawl_storage_folder: PathBuf::new(),
            max_depth_of_crawling: -1,
            max_pages_to_fetch: -1,
            politeness_delay_ms: 200,
            include_https_pages: true,
            include_binary_content: false,
            max_outgoing_links_per_page: 5000,
            follow_redirects: true,
            resumable_crawling: false,
            number_of_crawlers: 4,
            monitor_interval_ms: 5000,
            cleanup_grace_ms: 5000,
            tld_list_path: None,
            seeds: Vec::new(),
        }
    }
}

impl CrawlerConfig {
    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms.max(0) as u64)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn cleanup_grace(&self) -> Duration {
        Duration::from_millis(self.cleanup_grace_ms)
    }

    /// Folder holding the frontier queue and the document id registry
    pub fn frontier_folder(&self) -> PathBuf {
        self.crawl_storage_folder.join("frontier")
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    #[serde(rename = "user-agent-string")]
    pub user_agent_string: String,

    /// Idle connections kept per host
    #[serde(rename = "max-connections-per-host")]
    pub max_connections_per_host: usize,

    /// Requests that may be in flight at once across all workers
    #[serde(rename = "max-total-connections")]
    pub max_total_connections: usize,

    #[serde(rename = "socket-timeout-ms")]
    pub socket_timeout_ms: u64,

    #[serde(rename = "connection-timeout-ms")]
    pub connection_timeout_ms: u64,

    #[serde(rename = "max-download-size-bytes")]
    pub max_download_size_bytes: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent_string: "nanocrawl".to_string(),
            max_connections_per_host: 100,
            max_total_connections: 100,
            socket_timeout_ms: 20_000,
            connection_timeout_ms: 30_000,
            max_download_size_bytes: 1_048_576,
        }
    }
}

/// Outbound proxy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    pub host: String,

    #[serde(default = "default_proxy_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

fn default_proxy_port() -> u16 {
    80
}

/// robots.txt handling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RobotsConfig {
    pub enabled: bool,

    /// Agent name matched against `User-agent:` lines
    #[serde(rename = "user-agent-name")]
    pub user_agent_name: String,

    /// Maximum number of hosts whose directives are cached
    #[serde(rename = "cache-size")]
    pub cache_size: usize,
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user_agent_name: "nanocrawl".to_string(),
            cache_size: 500,
        }
    }
}
