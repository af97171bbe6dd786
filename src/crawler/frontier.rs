//! Crawl frontier
//!
//! Durable priority queue of admitted URLs that have not been fetched yet. Entries
//! are keyed so that an ascending byte scan of the store yields them in crawl order:
//! lower priority value first, then lower depth, then lower document id.

use crate::state::{CrawlStatistics, PROCESSED_PAGES, SCHEDULED_PAGES};
use crate::storage::{OrderedStore, StorageResult};
use crate::url::WebUrl;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

/// Length of a frontier key in bytes
pub const KEY_LEN: usize = 6;

/// Largest depth that still sorts distinctly; deeper items share this byte
pub const MAX_KEY_DEPTH: u8 = 127;

/// Builds the 6-byte queue key of a work item
///
/// Layout: priority, depth clamped to `[0, 127]`, then the document id as a
/// big-endian unsigned 32-bit integer.
///
/// # Examples
///
/// ```
/// use nanocrawl::crawler::encode_key;
/// use nanocrawl::url::{TldList, WebUrl};
///
/// let mut item = WebUrl::new("http://example.com/", &TldList::default());
/// item.priority = 0;
/// item.depth = 130;
/// item.doc_id = 300;
/// assert_eq!(encode_key(&item), [0x00, 0x7F, 0x00, 0x00, 0x01, 0x2C]);
/// ```
pub fn encode_key(item: &WebUrl) -> [u8; KEY_LEN] {
    let depth = item.depth.clamp(0, MAX_KEY_DEPTH as i16) as u8;
    let id = (item.doc_id as u32).to_be_bytes();
    [item.priority, depth, id[0], id[1], id[2], id[3]]
}

/// Splits a queue key back into `(priority, depth, doc_id)`
pub fn decode_key(key: &[u8]) -> Option<(u8, u8, i32)> {
    if key.len() != KEY_LEN {
        return None;
    }
    let id = u32::from_be_bytes([key[2], key[3], key[4], key[5]]);
    Some((key[0], key[1], id as i32))
}

struct FrontierInner {
    store: Box<dyn OrderedStore>,
    scheduled_pages: u64,
    processed_pages: u64,
    max_pages: i64,
}

impl FrontierInner {
    fn at_capacity(&self, pending: u64) -> bool {
        self.max_pages >= 0 && self.scheduled_pages + pending >= self.max_pages as u64
    }
}

/// Priority work queue shared by every worker
///
/// Holds the crawl's terminal flag as well: once `finish` is called, blocked takers
/// wake up empty-handed and the workers wind down.
pub struct CrawlFrontier {
    inner: Mutex<FrontierInner>,
    statistics: Arc<CrawlStatistics>,
    finished: AtomicBool,
    arrivals: Notify,
}

impl CrawlFrontier {
    /// Creates a frontier over `store`
    ///
    /// With `resumable` set, entries left in the store by a previous run count as
    /// already scheduled, so the page cap covers both runs.
    pub fn new(
        store: Box<dyn OrderedStore>,
        max_pages_to_fetch: i64,
        statistics: Arc<CrawlStatistics>,
        resumable: bool,
    ) -> StorageResult<Self> {
        let scheduled_pages = if resumable { store.count()? } else { 0 };
        if scheduled_pages > 0 {
            tracing::info!(
                "Resuming crawl with {} pages left in the frontier",
                scheduled_pages
            );
        }

        Ok(Self {
            inner: Mutex::new(FrontierInner {
                store,
                scheduled_pages,
                processed_pages: 0,
                max_pages: max_pages_to_fetch,
            }),
            statistics,
            finished: AtomicBool::new(false),
            arrivals: Notify::new(),
        })
    }

    /// Admits one item unless the page cap is reached
    ///
    /// # Returns
    ///
    /// * `true` - If the item was persisted
    /// * `false` - If the cap rejected it or the store failed
    pub async fn schedule(&self, item: &WebUrl) -> bool {
        let admitted = {
            let mut inner = self.inner.lock().await;
            if inner.at_capacity(0) {
                false
            } else {
                match put_item(&mut inner, item) {
                    Ok(()) => {
                        inner.scheduled_pages += 1;
                        true
                    }
                    Err(e) => {
                        tracing::error!("Failed to schedule {}: {}", item, e);
                        false
                    }
                }
            }
        };

        if admitted {
            self.statistics.increment(SCHEDULED_PAGES).await;
            self.arrivals.notify_waiters();
        }
        admitted
    }

    /// Admits items in order until the page cap is reached
    ///
    /// Items past the cap are dropped; the ones before it stay admitted.
    ///
    /// # Returns
    ///
    /// The number of items admitted
    pub async fn schedule_batch(&self, items: &[WebUrl]) -> usize {
        let admitted = {
            let mut inner = self.inner.lock().await;
            let mut admitted = 0u64;
            for item in items {
                if inner.at_capacity(admitted) {
                    tracing::debug!(
                        "Page cap reached, dropping {} of {} links",
                        items.len() as u64 - admitted,
                        items.len()
                    );
                    break;
                }
                match put_item(&mut inner, item) {
                    Ok(()) => admitted += 1,
                    Err(e) => tracing::error!("Failed to schedule {}: {}", item, e),
                }
            }
            inner.scheduled_pages += admitted;
            admitted
        };

        if admitted > 0 {
            self.statistics.increment_by(SCHEDULED_PAGES, admitted).await;
            self.arrivals.notify_waiters();
        }
        admitted as usize
    }

    /// Removes and returns up to `max` items in key order, waiting for work if needed
    ///
    /// Returned entries are gone from the store. Returns an empty list only once the
    /// frontier is finished.
    pub async fn take(&self, max: usize) -> Vec<WebUrl> {
        loop {
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_finished() {
                return Vec::new();
            }

            {
                let mut inner = self.inner.lock().await;
                let items = take_locked(&mut inner, max);
                if !items.is_empty() {
                    return items;
                }
            }

            notified.await;
        }
    }

    /// Marks the crawl as over and wakes every blocked taker
    pub fn finish(&self) {
        if !self.finished.swap(true, Ordering::SeqCst) {
            tracing::debug!("Frontier finished");
        }
        self.arrivals.notify_waiters();
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Number of items waiting to be taken
    pub async fn queue_length(&self) -> u64 {
        let inner = self.inner.lock().await;
        match inner.store.count() {
            Ok(count) => count,
            Err(e) => {
                tracing::error!("Failed to count frontier entries: {}", e);
                0
            }
        }
    }

    /// Records that a taken item went through a worker
    pub async fn set_processed(&self, item: &WebUrl) {
        {
            let mut inner = self.inner.lock().await;
            inner.processed_pages += 1;
        }
        tracing::trace!("Processed {}", item);
        self.statistics.increment(PROCESSED_PAGES).await;
    }

    pub async fn processed_pages(&self) -> u64 {
        self.inner.lock().await.processed_pages
    }

    pub async fn scheduled_pages(&self) -> u64 {
        self.inner.lock().await.scheduled_pages
    }

    pub async fn sync(&self) -> StorageResult<()> {
        self.inner.lock().await.store.sync()
    }

    pub async fn close(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock().await;
        inner.store.sync()?;
        inner.store.close()
    }
}

fn put_item(inner: &mut FrontierInner, item: &WebUrl) -> StorageResult<()> {
    let value = serde_json::to_vec(item)?;
    inner.store.put(&encode_key(item), &value)
}

fn take_locked(inner: &mut FrontierInner, max: usize) -> Vec<WebUrl> {
    let entries = match inner.store.cursor(max) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!("Failed to read the frontier: {}", e);
            return Vec::new();
        }
    };

    let mut items = Vec::with_capacity(entries.len());
    for (key, value) in entries {
        if let Err(e) = inner.store.delete(&key) {
            tracing::error!("Failed to remove frontier entry {:?}: {}", key, e);
            continue;
        }
        match serde_json::from_slice::<WebUrl>(&value) {
            Ok(item) => items.push(item),
            Err(e) => tracing::error!("Dropping undecodable frontier entry {:?}: {}", key, e),
        }
    }
    items
}
