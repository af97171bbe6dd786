use crate::url::domain::{split_host, TldList};
use serde::{Deserialize, Serialize};
use url::Url;

/// Document id of a URL that has not been registered yet
pub const UNASSIGNED_DOC_ID: i32 = -1;

/// Depth given to a link whose URL was already registered when it was found
pub const ALREADY_SEEN_DEPTH: i16 = -1;

/// Neutral priority used when a visitor does not rank URLs
pub const DEFAULT_PRIORITY: u8 = 128;

/// A crawlable URL together with its discovery metadata
///
/// This is the unit of work stored in the frontier. Lower `priority` values are
/// fetched first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebUrl {
    url: String,
    pub doc_id: i32,
    pub parent_doc_id: i32,
    pub parent_url: Option<String>,
    pub depth: i16,
    domain: String,
    sub_domain: String,
    path: String,
    pub anchor: String,
    pub priority: u8,
}

impl WebUrl {
    /// Creates an unregistered work item for an already canonical URL
    pub fn new(url: impl Into<String>, tld_list: &TldList) -> Self {
        let mut web_url = Self {
            url: String::new(),
            doc_id: UNASSIGNED_DOC_ID,
            parent_doc_id: UNASSIGNED_DOC_ID,
            parent_url: None,
            depth: 0,
            domain: String::new(),
            sub_domain: String::new(),
            path: String::new(),
            anchor: String::new(),
            priority: DEFAULT_PRIORITY,
        };
        web_url.set_url(url, tld_list);
        web_url
    }

    /// Replaces the URL and recomputes domain, subdomain and path
    pub fn set_url(&mut self, url: impl Into<String>, tld_list: &TldList) {
        self.url = url.into();
        match Url::parse(&self.url) {
            Ok(parsed) => {
                let host = parsed.host_str().unwrap_or_default().to_lowercase();
                let (domain, sub_domain) = split_host(&host, tld_list);
                self.domain = domain;
                self.sub_domain = sub_domain;
                self.path = parsed.path().to_string();
            }
            Err(_) => {
                self.domain.clear();
                self.sub_domain.clear();
                self.path.clear();
            }
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn sub_domain(&self) -> &str {
        &self.sub_domain
    }

    /// Path part of the URL, without query
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn has_doc_id(&self) -> bool {
        self.doc_id > 0
    }

    pub fn is_https(&self) -> bool {
        self.url.starts_with("https://")
    }
}

impl std::fmt::Display for WebUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.url)
    }
}
