//! Crawl-wide counters
//!
//! Counters live only in memory and start from zero on every run.

use std::collections::HashMap;
use tokio::sync::Mutex;

/// Pages admitted to the frontier
pub const SCHEDULED_PAGES: &str = "scheduled-pages";

/// Pages taken from the frontier and run through a worker
pub const PROCESSED_PAGES: &str = "processed-pages";

/// Named, monotonically increasing counters shared by all workers
#[derive(Debug, Default)]
pub struct CrawlStatistics {
    counters: Mutex<HashMap<String, u64>>,
}

impl CrawlStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `name`, zero if it was never touched
    pub async fn value(&self, name: &str) -> u64 {
        let counters = self.counters.lock().await;
        counters.get(name).copied().unwrap_or(0)
    }

    pub async fn increment(&self, name: &str) {
        self.increment_by(name, 1).await;
    }

    pub async fn increment_by(&self, name: &str, amount: u64) {
        let mut counters = self.counters.lock().await;
        *counters.entry(name.to_string()).or_insert(0) += amount;
    }

    /// Copy of every counter, for reporting
    pub async fn snapshot(&self) -> HashMap<String, u64> {
        self.counters.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_counter_is_zero() {
        let stats = CrawlStatistics::new();
        assert_eq!(stats.value(SCHEDULED_PAGES).await, 0);
    }

    #[tokio::test]
    async fn test_increment() {
        let stats = CrawlStatistics::new();
        stats.increment(PROCESSED_PAGES).await;
        stats.increment(PROCESSED_PAGES).await;
        stats.increment_by(SCHEDULED_PAGES, 5).await;

        assert_eq!(stats.value(PROCESSED_PAGES).await, 2);
        assert_eq!(stats.value(SCHEDULED_PAGES).await, 5);

        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let stats = std::sync::Arc::new(CrawlStatistics::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let stats = stats.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    stats.increment(PROCESSED_PAGES).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(stats.value(PROCESSED_PAGES).await, 800);
    }
}
