//! URL identity for the crawl engine
//!
//! This module provides URL canonicalization, domain/subdomain decomposition and the
//! [`WebUrl`] work item that flows through the frontier.

mod domain;
mod normalize;
mod web_url;

// Re-export main types and functions
pub use domain::{extract_host, split_host, TldList};
pub use normalize::{canonicalize, canonicalize_url};
pub use web_url::{WebUrl, ALREADY_SEEN_DEPTH, DEFAULT_PRIORITY, UNASSIGNED_DOC_ID};
