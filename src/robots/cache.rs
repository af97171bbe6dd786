//! Bounded robots.txt directive cache
//!
//! Entries never expire. When the cache is full, the host that was looked up least
//! recently is evicted to make room.

use crate::robots::HostDirectives;
use std::collections::HashMap;

/// Host directives keyed by `host[:port]`, bounded by a fixed capacity
///
/// Recency is tracked with a logical clock that advances on every lookup and insert,
/// so two accesses never share a timestamp.
#[derive(Debug)]
pub struct DirectivesCache {
    capacity: usize,
    clock: u64,
    entries: HashMap<String, HostDirectives>,
}

impl DirectivesCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            clock: 0,
            entries: HashMap::new(),
        }
    }

    /// Looks up a host and marks it as recently used
    pub fn get(&mut self, host: &str) -> Option<&HostDirectives> {
        let tick = self.next_tick();
        let entry = self.entries.get_mut(host)?;
        entry.touch(tick);
        Some(entry)
    }

    /// Inserts directives for a host, evicting first if the cache is full
    ///
    /// # Returns
    ///
    /// The evicted host, if any
    pub fn insert(&mut self, host: String, mut directives: HostDirectives) -> Option<String> {
        let mut evicted = None;
        if !self.entries.contains_key(&host) && self.entries.len() >= self.capacity {
            evicted = self.least_recently_accessed();
            if let Some(victim) = &evicted {
                self.entries.remove(victim);
            }
        }

        directives.touch(self.next_tick());
        self.entries.insert(host, directives);
        evicted
    }

    pub fn contains(&self, host: &str) -> bool {
        self.entries.contains_key(host)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn least_recently_accessed(&self) -> Option<String> {
        self.entries
            .iter()
            .min_by_key(|(_, directives)| directives.last_access())
            .map(|(host, _)| host.clone())
    }

    fn next_tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_host() {
        let mut cache = DirectivesCache::new(2);
        assert!(cache.get("example.com").is_none());
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let mut cache = DirectivesCache::new(3);
        for i in 0..10 {
            cache.insert(format!("host{}.test", i), HostDirectives::allow_all());
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_evicts_least_recently_inserted_without_lookups() {
        let mut cache = DirectivesCache::new(2);
        cache.insert("a.test".to_string(), HostDirectives::allow_all());
        cache.insert("b.test".to_string(), HostDirectives::allow_all());

        let evicted = cache.insert("c.test".to_string(), HostDirectives::allow_all());
        assert_eq!(evicted.as_deref(), Some("a.test"));
        assert!(!cache.contains("a.test"));
        assert!(cache.contains("b.test"));
        assert!(cache.contains("c.test"));
    }

    #[test]
    fn test_lookup_refreshes_recency() {
        let mut cache = DirectivesCache::new(2);
        cache.insert("a.test".to_string(), HostDirectives::allow_all());
        cache.insert("b.test".to_string(), HostDirectives::allow_all());

        // a is now more recent than b
        assert!(cache.get("a.test").is_some());

        let evicted = cache.insert("c.test".to_string(), HostDirectives::allow_all());
        assert_eq!(evicted.as_deref(), Some("b.test"));
        assert!(cache.contains("a.test"));
    }

    #[test]
    fn test_evicts_exactly_one_entry() {
        let mut cache = DirectivesCache::new(3);
        for host in ["a.test", "b.test", "c.test"] {
            cache.insert(host.to_string(), HostDirectives::allow_all());
        }
        cache.get("a.test");
        cache.get("c.test");

        let evicted = cache.insert("d.test".to_string(), HostDirectives::allow_all());
        assert_eq!(evicted.as_deref(), Some("b.test"));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_reinsert_existing_host_does_not_evict() {
        let mut cache = DirectivesCache::new(2);
        cache.insert("a.test".to_string(), HostDirectives::allow_all());
        cache.insert("b.test".to_string(), HostDirectives::allow_all());

        let evicted = cache.insert("a.test".to_string(), HostDirectives::allow_all());
        assert!(evicted.is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_new_entry_fetched_at_is_recent() {
        let directives = HostDirectives::allow_all();
        assert!(chrono::Utc::now() - directives.fetched_at() < chrono::Duration::minutes(1));
    }
}
