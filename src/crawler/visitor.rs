//! Pluggable crawl policy
//!
//! A [`Visitor`] decides which discovered URLs are worth crawling, how urgent they
//! are, and what happens to each page once it has been fetched and parsed. Each
//! worker gets its own visitor value.

use crate::crawler::fetcher::PageContent;
use crate::crawler::parser::ParseData;
use crate::url::{WebUrl, DEFAULT_PRIORITY};
use reqwest::header::HeaderMap;

/// A fetched and parsed page, as handed to [`Visitor::visit`]
#[derive(Debug, Clone)]
pub struct Page {
    pub web_url: WebUrl,
    pub status_code: u16,
    pub headers: HeaderMap,
    pub content: PageContent,
    pub parse_data: ParseData,

    /// Every link found on the page, with its parent set
    ///
    /// Links that were registered before this page was parsed carry
    /// [`ALREADY_SEEN_DEPTH`](crate::url::ALREADY_SEEN_DEPTH) and their existing id.
    pub outgoing_urls: Vec<WebUrl>,
}

impl Page {
    pub fn url(&self) -> &str {
        self.web_url.url()
    }

    pub fn title(&self) -> Option<&str> {
        match &self.parse_data {
            ParseData::Html(data) => data.title.as_deref(),
            _ => None,
        }
    }

    /// Extracted text: body text for HTML, the whole body for plain text
    pub fn text(&self) -> Option<&str> {
        match &self.parse_data {
            ParseData::Html(data) => Some(&data.text),
            ParseData::Text(text) => Some(text),
            ParseData::Binary => None,
        }
    }
}

/// Hooks a crawl calls into
///
/// Every method has a default, so a visitor only overrides what it needs. Methods
/// take `&self` because the controller calls lifecycle hooks while the worker still
/// holds the visitor; implementations keep mutable state behind their own locks.
pub trait Visitor: Send + Sync {
    /// Called once by the worker before it takes its first URL
    fn on_start(&self) {}

    /// Admission predicate for a discovered or redirected URL, called before any fetch
    fn should_visit(&self, _url: &WebUrl) -> bool {
        true
    }

    /// Queue priority of an admitted URL; lower values are crawled first
    fn priority(&self, _url: &WebUrl) -> u8 {
        DEFAULT_PRIORITY
    }

    /// Called once for every page that was fetched and parsed
    fn visit(&self, _page: &Page) {}

    /// Called after every header fetch with the status code and its description
    fn handle_page_status_code(&self, _url: &WebUrl, _status_code: u16, _description: &str) {}

    fn on_content_fetch_error(&self, _url: &WebUrl) {}

    fn on_parse_error(&self, _url: &WebUrl) {}

    /// Called by the controller once the crawl has completed
    fn on_before_exit(&self) {}
}

/// Visitor that accepts every URL and ignores every page
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopVisitor;

impl Visitor for NoopVisitor {}
