//! Polite HTTP fetcher
//!
//! This module wraps the HTTP client with the crawl's fetch rules:
//! - One global minimum gap between outbound requests, shared by every worker
//! - No transport-level redirects; redirect targets are reported back instead
//! - A cap on the number of requests in flight
//! - A cap on body size, checked against the declared length and while streaming

use crate::config::Config;
use crate::url::{canonicalize, WebUrl};
use reqwest::header::{HeaderMap, CONTENT_ENCODING, CONTENT_TYPE, LOCATION};
use reqwest::{redirect::Policy, Client, Proxy, Response};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

/// Outcome class of a header fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// The server answered with this HTTP status
    Http(u16),

    /// The body is larger than the configured maximum
    PageTooBig,

    /// Connection, DNS, TLS or timeout failure
    TransportError,

    /// Anything else that went wrong before a status was received
    UnknownError,
}

impl FetchStatus {
    /// Numeric code handed to visitors; non-HTTP outcomes use codes above 1000
    pub fn code(&self) -> u16 {
        match self {
            Self::Http(code) => *code,
            Self::PageTooBig => 1001,
            Self::TransportError => 1005,
            Self::UnknownError => 1006,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::Http(code) => reqwest::StatusCode::from_u16(*code)
                .ok()
                .and_then(|status| status.canonical_reason())
                .unwrap_or("Unknown HTTP status")
                .to_string(),
            Self::PageTooBig => "Page size was too big".to_string(),
            Self::TransportError => "Fatal transport error".to_string(),
            Self::UnknownError => "Unknown error".to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Http(200))
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Http(301 | 302 | 303 | 307 | 308))
    }
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code(), self.description())
    }
}

/// Errors from reading a response body
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Transport error while reading body: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Body exceeded {max} bytes")]
    PageTooBig { max: u64 },

    #[error("No body available: header fetch did not succeed or body was already read")]
    NoContent,
}

/// Result of a header fetch
///
/// Holds the open response and a connection slot until the body is read or the
/// result is dropped, so every exit path releases the connection.
#[derive(Debug)]
pub struct FetchResult {
    pub status: FetchStatus,
    pub headers: HeaderMap,

    /// Canonical URL that was actually fetched, set for 200 responses
    pub fetched_url: Option<String>,

    /// Canonical redirect target, set for redirect responses with a usable `Location`
    pub moved_to_url: Option<String>,

    response: Option<Response>,
    permit: Option<OwnedSemaphorePermit>,
}

impl FetchResult {
    fn without_response(status: FetchStatus) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            fetched_url: None,
            moved_to_url: None,
            response: None,
            permit: None,
        }
    }

    pub fn has_body(&self) -> bool {
        self.response.is_some()
    }

    /// Drops the response without reading it and frees the connection slot
    pub fn discard(&mut self) {
        self.response = None;
        self.permit = None;
    }
}

/// A fully read response body
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub charset: Option<String>,
}

impl PageContent {
    /// Body decoded as text; invalid UTF-8 sequences are replaced
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }

    fn mime(&self) -> String {
        self.content_type
            .as_deref()
            .unwrap_or_default()
            .to_lowercase()
    }

    pub fn is_plain_text(&self) -> bool {
        let mime = self.mime();
        mime.contains("text") && mime.contains("plain")
    }

    /// Images, audio, video and non-markup application types
    pub fn is_binary(&self) -> bool {
        let mime = self.mime();
        mime.contains("image")
            || mime.contains("audio")
            || mime.contains("video")
            || (mime.contains("application") && !mime.contains("html"))
    }
}

/// Builds the HTTP client used for every crawl request
///
/// Redirects are never followed by the client; the crawl engine decides what to do
/// with them.
///
/// # Arguments
///
/// * `config` - The crawl configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client or proxy
pub fn build_http_client(config: &Config) -> Result<Client, reqwest::Error> {
    let fetcher = &config.fetcher;

    let mut builder = Client::builder()
        .user_agent(fetcher.user_agent_string.clone())
        .timeout(Duration::from_millis(fetcher.socket_timeout_ms))
        .connect_timeout(Duration::from_millis(fetcher.connection_timeout_ms))
        .pool_max_idle_per_host(fetcher.max_connections_per_host)
        .redirect(Policy::none())
        .gzip(true)
        .brotli(true);

    if let Some(proxy_config) = &config.proxy {
        let mut proxy = Proxy::all(format!("http://{}:{}", proxy_config.host, proxy_config.port))?;
        if let Some(username) = &proxy_config.username {
            proxy = proxy.basic_auth(username, proxy_config.password.as_deref().unwrap_or(""));
        }
        builder = builder.proxy(proxy);
    }

    builder.build()
}

/// Rate-limited, size-bounded page fetcher shared by all workers
pub struct PoliteFetcher {
    client: Client,
    politeness_delay: Duration,
    max_download_size: u64,
    last_fetch: Mutex<Option<Instant>>,
    connections: Arc<Semaphore>,
}

impl PoliteFetcher {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            politeness_delay: config.crawler.politeness_delay(),
            max_download_size: config.fetcher.max_download_size_bytes,
            last_fetch: Mutex::new(None),
            connections: Arc::new(Semaphore::new(config.fetcher.max_total_connections)),
        })
    }

    /// Sends a GET for `web_url` and classifies the response head
    ///
    /// # Status Handling
    ///
    /// | Response | Result |
    /// |----------|--------|
    /// | 200, length within limit | `Http(200)`, body kept open, `fetched_url` set |
    /// | 200, declared length over limit | `PageTooBig`, body dropped |
    /// | 301/302/303/307/308 | `Http(code)`, `moved_to_url` from `Location` |
    /// | other status | `Http(code)`, body dropped |
    /// | connect/timeout/IO failure | `TransportError` |
    /// | fetcher shut down or request not buildable | `UnknownError` / `TransportError` |
    pub async fn fetch_header(&self, web_url: &WebUrl) -> FetchResult {
        let permit = match self.connections.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("Fetcher is shut down, not fetching {}", web_url);
                return FetchResult::without_response(FetchStatus::TransportError);
            }
        };

        self.wait_for_fetch_slot().await;

        let response = match self.client.get(web_url.url()).send().await {
            Ok(response) => response,
            Err(e) => {
                let status = if e.is_builder() {
                    FetchStatus::UnknownError
                } else {
                    FetchStatus::TransportError
                };
                tracing::warn!("Fetch of {} failed: {}", web_url, e);
                return FetchResult::without_response(status);
            }
        };

        let code = response.status().as_u16();
        let mut result = FetchResult::without_response(FetchStatus::Http(code));
        result.headers = response.headers().clone();

        if code != 200 {
            if result.status.is_redirect() {
                result.moved_to_url = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|location| canonicalize(location, Some(web_url.url())).ok());
            } else if code != 404 {
                tracing::debug!(
                    "Failed: {}, while fetching {}",
                    result.status.description(),
                    web_url
                );
            }
            return result;
        }

        let effective = canonicalize(response.url().as_str(), None)
            .unwrap_or_else(|_| web_url.url().to_string());
        result.fetched_url = Some(effective);

        if let Some(length) = response.content_length() {
            if length > self.max_download_size {
                tracing::info!(
                    "Skipping {}: declared size {} exceeds {}",
                    web_url,
                    length,
                    self.max_download_size
                );
                result.status = FetchStatus::PageTooBig;
                return result;
            }
        }

        result.response = Some(response);
        result.permit = Some(permit);
        result
    }

    /// Reads the body of a successful header fetch
    ///
    /// The body is streamed and abandoned as soon as it grows past the maximum. The
    /// connection slot is released whether or not this succeeds.
    pub async fn fetch_content(&self, result: &mut FetchResult) -> Result<PageContent, FetchError> {
        let mut response = result.response.take().ok_or(FetchError::NoContent)?;
        let _permit = result.permit.take();

        let content_type = header_string(&result.headers, CONTENT_TYPE);
        let content_encoding = header_string(&result.headers, CONTENT_ENCODING);
        let charset = content_type.as_deref().and_then(charset_from_content_type);

        let mut data = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (data.len() + chunk.len()) as u64 > self.max_download_size {
                return Err(FetchError::PageTooBig {
                    max: self.max_download_size,
                });
            }
            data.extend_from_slice(&chunk);
        }

        Ok(PageContent {
            data,
            content_type,
            content_encoding,
            charset,
        })
    }

    /// Closes the fetcher; later header fetches report a transport error
    pub fn shutdown(&self) {
        self.connections.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.connections.is_closed()
    }

    /// Sleeps until the global politeness gap has passed, then claims the slot
    ///
    /// The lock is held while sleeping so concurrent workers queue up behind it.
    async fn wait_for_fetch_slot(&self) {
        let mut last_fetch = self.last_fetch.lock().await;
        if let Some(previous) = *last_fetch {
            let elapsed = previous.elapsed();
            if elapsed < self.politeness_delay {
                tokio::time::sleep(self.politeness_delay - elapsed).await;
            }
        }
        *last_fetch = Some(Instant::now());
    }
}

fn header_string(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Extracts the `charset=` parameter of a Content-Type value
fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_lowercase())
        } else {
            None
        }
    })
}
