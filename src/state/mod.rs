//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `WorkerState`: where a crawl worker is in its per-page cycle
//! - `CrawlStatistics`: scheduled and processed page counters

mod statistics;
mod worker_state;

// Re-export main types
pub use statistics::{CrawlStatistics, PROCESSED_PAGES, SCHEDULED_PAGES};
pub use worker_state::WorkerState;
