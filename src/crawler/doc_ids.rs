//! Document id registry
//!
//! Maps every canonical URL the crawl has seen to a stable integer id. Ids start at 1,
//! only ever grow and are never reused. The registry is the crawl's dedup oracle.

use crate::storage::{OrderedStore, StorageError, StorageResult};
use crate::CrawlError;
use tokio::sync::Mutex;

struct RegistryInner {
    store: Box<dyn OrderedStore>,
    last_doc_id: i32,
}

/// Durable canonical URL to document id map
///
/// Every operation runs under one registry-wide lock: id allocation must have a
/// single writer.
pub struct DocumentIdRegistry {
    inner: Mutex<RegistryInner>,
}

impl DocumentIdRegistry {
    /// Opens the registry over `store`, resuming after the largest id it holds
    pub fn new(store: Box<dyn OrderedStore>) -> StorageResult<Self> {
        let mut last_doc_id = 0;
        for (key, value) in store.cursor(usize::MAX)? {
            let id = decode_doc_id(&value).ok_or_else(|| {
                StorageError::Corrupt(format!(
                    "doc id value for {} is {} bytes",
                    String::from_utf8_lossy(&key),
                    value.len()
                ))
            })?;
            last_doc_id = last_doc_id.max(id);
        }

        if last_doc_id > 0 {
            tracing::info!("Document id registry resumed at id {}", last_doc_id);
        }

        Ok(Self {
            inner: Mutex::new(RegistryInner { store, last_doc_id }),
        })
    }

    /// Returns the id of `url`, or `None` if it was never registered
    ///
    /// Storage failures are logged and reported as "not seen".
    pub async fn lookup(&self, url: &str) -> Option<i32> {
        let inner = self.inner.lock().await;
        lookup_locked(&inner, url)
    }

    pub async fn is_seen(&self, url: &str) -> bool {
        self.lookup(url).await.is_some()
    }

    /// Returns the existing id of `url` or registers it under the next id
    pub async fn assign_if_absent(&self, url: &str) -> StorageResult<i32> {
        let mut inner = self.inner.lock().await;
        if let Some(id) = lookup_locked(&inner, url) {
            return Ok(id);
        }
        allocate_locked(&mut inner, url)
    }

    /// Registers `url` only if nobody has registered it yet
    ///
    /// Returns the fresh id for the caller that wins, `None` for every later caller.
    /// Workers admit a link to the frontier only when they win the claim, which keeps
    /// a URL from being enqueued twice.
    pub async fn claim(&self, url: &str) -> StorageResult<Option<i32>> {
        let mut inner = self.inner.lock().await;
        if lookup_locked(&inner, url).is_some() {
            return Ok(None);
        }
        allocate_locked(&mut inner, url).map(Some)
    }

    /// Records a caller-chosen id for `url`
    ///
    /// Succeeds without change when `url` already has exactly `doc_id`. Fails with
    /// `IdConflict` when `url` has another id, or when `doc_id` is not greater than
    /// the last id handed out.
    pub async fn reserve(&self, url: &str, doc_id: i32) -> Result<(), CrawlError> {
        let mut inner = self.inner.lock().await;

        match lookup_locked(&inner, url) {
            Some(existing) if existing == doc_id => return Ok(()),
            Some(existing) => {
                return Err(CrawlError::IdConflict {
                    url: url.to_string(),
                    requested: doc_id,
                    reason: format!("URL is already registered with id {}", existing),
                })
            }
            None => {}
        }

        if doc_id <= inner.last_doc_id {
            return Err(CrawlError::IdConflict {
                url: url.to_string(),
                requested: doc_id,
                reason: format!("ids up to {} are already assigned", inner.last_doc_id),
            });
        }

        inner.store.put(url.as_bytes(), &encode_doc_id(doc_id))?;
        inner.last_doc_id = doc_id;
        Ok(())
    }

    pub async fn last_doc_id(&self) -> i32 {
        self.inner.lock().await.last_doc_id
    }

    /// Number of registered URLs
    pub async fn doc_count(&self) -> u64 {
        let inner = self.inner.lock().await;
        match inner.store.count() {
            Ok(count) => count,
            Err(e) => {
                tracing::error!("Failed to count registered documents: {}", e);
                0
            }
        }
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

fn lookup_locked(inner: &RegistryInner, url: &str) -> Option<i32> {
    match inner.store.get(url.as_bytes()) {
        Ok(Some(value)) => decode_doc_id(&value),
        Ok(None) => None,
        Err(e) => {
            tracing::error!("Failed to look up document id for {}: {}", url, e);
            None
        }
    }
}

fn allocate_locked(inner: &mut RegistryInner, url: &str) -> StorageResult<i32> {
    let id = inner.last_doc_id + 1;
    inner.store.put(url.as_bytes(), &encode_doc_id(id))?;
    inner.last_doc_id = id;
    Ok(id)
}

fn encode_doc_id(id: i32) -> [u8; 4] {
    id.to_be_bytes()
}

fn decode_doc_id(bytes: &[u8]) -> Option<i32> {
    let bytes: [u8; 4] = bytes.try_into().ok()?;
    Some(i32::from_be_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use std::sync::Arc;

    fn create_test_registry() -> DocumentIdRegistry {
        DocumentIdRegistry::new(Box::new(SqliteStore::open_in_memory().unwrap())).unwrap()
    }

    #[tokio::test]
    async fn test_lookup_unknown_url() {
        let registry = create_test_registry();
        assert_eq!(registry.lookup("http://a.test/").await, None);
        assert!(!registry.is_seen("http://a.test/").await);
    }

    #[tokio::test]
    async fn test_assign_is_idempotent() {
        let registry = create_test_registry();
        let first = registry.assign_if_absent("http://a.test/").await.unwrap();
        let second = registry.assign_if_absent("http://a.test/").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, 1);
        assert!(registry.is_seen("http://a.test/").await);
    }

    #[tokio::test]
    async fn test_ids_strictly_increase() {
        let registry = create_test_registry();
        let mut previous = 0;
        for i in 0..20 {
            let id = registry
                .assign_if_absent(&format!("http://a.test/{}", i))
                .await
                .unwrap();
            assert!(id > previous);
            previous = id;
        }
        assert_eq!(registry.last_doc_id().await, 20);
        assert_eq!(registry.doc_count().await, 20);
    }

    #[tokio::test]
    async fn test_claim_only_wins_once() {
        let registry = create_test_registry();
        let first = registry.claim("http://a.test/").await.unwrap();
        let second = registry.claim("http://a.test/").await.unwrap();
        assert_eq!(first, Some(1));
        assert_eq!(second, None);
        assert_eq!(registry.lookup("http://a.test/").await, Some(1));
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let registry = Arc::new(create_test_registry());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.claim("http://race.test/").await.unwrap()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(registry.last_doc_id().await, 1);
    }

    #[tokio::test]
    async fn test_reserve_exact_match_is_noop() {
        let registry = create_test_registry();
        registry.reserve("http://a.test/", 10).await.unwrap();
        registry.reserve("http://a.test/", 10).await.unwrap();
        assert_eq!(registry.lookup("http://a.test/").await, Some(10));
        assert_eq!(registry.last_doc_id().await, 10);
    }

    #[tokio::test]
    async fn test_reserve_rejects_id_not_above_last() {
        let registry = create_test_registry();
        registry.assign_if_absent("http://a.test/").await.unwrap();
        registry.assign_if_absent("http://b.test/").await.unwrap();

        let result = registry.reserve("http://c.test/", 2).await;
        assert!(matches!(result, Err(CrawlError::IdConflict { requested: 2, .. })));

        let result = registry.reserve("http://c.test/", 1).await;
        assert!(matches!(result, Err(CrawlError::IdConflict { .. })));

        assert!(registry.reserve("http://c.test/", 3).await.is_ok());
    }

    #[tokio::test]
    async fn test_reserve_rejects_different_existing_id() {
        let registry = create_test_registry();
        registry.reserve("http://a.test/", 5).await.unwrap();

        let result = registry.reserve("http://a.test/", 6).await;
        assert!(matches!(result, Err(CrawlError::IdConflict { .. })));
    }

    #[tokio::test]
    async fn test_allocation_continues_after_reserve() {
        let registry = create_test_registry();
        registry.reserve("http://seed.test/", 100).await.unwrap();
        let next = registry.assign_if_absent("http://other.test/").await.unwrap();
        assert_eq!(next, 101);
    }

    #[tokio::test]
    async fn test_resume_from_existing_store() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("doc_ids.db");

        {
            let registry =
                DocumentIdRegistry::new(Box::new(SqliteStore::open(&path).unwrap())).unwrap();
            registry.assign_if_absent("http://a.test/").await.unwrap();
            registry.reserve("http://b.test/", 42).await.unwrap();
            registry.close().await.unwrap();
        }

        let registry = DocumentIdRegistry::new(Box::new(SqliteStore::open(&path).unwrap())).unwrap();
        assert_eq!(registry.last_doc_id().await, 42);
        assert_eq!(registry.lookup("http://a.test/").await, Some(1));
        assert_eq!(registry.assign_if_absent("http://c.test/").await.unwrap(), 43);
    }

    #[test]
    fn test_id_value_layout_is_big_endian() {
        assert_eq!(encode_doc_id(300), [0x00, 0x00, 0x01, 0x2C]);
        assert_eq!(decode_doc_id(&[0x00, 0x00, 0x01, 0x2C]), Some(300));
        assert_eq!(decode_doc_id(&[0x01]), None);
    }

    #[tokio::test]
    async fn test_closed_registry_fails_allocation() {
        let registry = create_test_registry();
        registry.close().await.unwrap();
        assert!(registry.assign_if_absent("http://a.test/").await.is_err());
        assert_eq!(registry.lookup("http://a.test/").await, None);
    }
}
