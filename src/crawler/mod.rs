//! Crawler module: the crawl engine itself
//!
//! This module contains:
//! - The durable frontier and document id registry
//! - The polite, size-bounded fetcher
//! - Content parsing and link extraction
//! - The per-page worker state machine and the visitor hooks it calls
//! - The controller that seeds, runs and finishes a crawl

mod controller;
mod doc_ids;
mod fetcher;
mod frontier;
mod parser;
mod visitor;
mod worker;

pub use controller::{CrawlController, DOC_IDS_DB, QUEUE_DB};
pub use doc_ids::DocumentIdRegistry;
pub use fetcher::{
    build_http_client, FetchError, FetchResult, FetchStatus, PageContent, PoliteFetcher,
};
pub use frontier::{decode_key, encode_key, CrawlFrontier, KEY_LEN, MAX_KEY_DEPTH};
pub use parser::{ExtractedLink, HtmlParseData, ParseData, ParseError, Parser};
pub use visitor::{NoopVisitor, Page, Visitor};
pub use worker::{CrawlContext, CrawlWorker, WorkerStatus};
