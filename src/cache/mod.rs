//! Cache module for resolved pages
//!
//! Resolutions are keyed by the page URL the caller asked for. Entries
//! expire a fixed time after insertion; an expired entry is dropped the
//! next time it is read, or by the sweep a write runs once the map is large.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::models::Resolution;

/// Default time-to-live of a cached resolution (5 minutes)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Entry count above which a write sweeps expired entries
const SWEEP_THRESHOLD: usize = 100;

/// Storage for finished resolutions, shared by concurrent requests
pub trait ResolutionCache: Send + Sync {
    /// Fresh entry for `key`, if any
    fn get(&self, key: &str) -> Option<Arc<Resolution>>;

    /// Store `resolution`, replacing any previous entry for `key`
    fn put(&self, key: &str, resolution: Resolution);

    /// Remove one entry; true when something was removed
    fn evict(&self, key: &str) -> bool;

    /// Remove every entry, returning how many there were
    fn purge(&self) -> usize;

    /// Number of stored entries, expired ones included
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    resolution: Arc<Resolution>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Process-local cache with a fixed TTL
#[derive(Debug)]
pub struct InMemoryCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl ResolutionCache for InMemoryCache {
    fn get(&self, key: &str) -> Option<Arc<Resolution>> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired() => {
                    return Some(Arc::clone(&entry.resolution));
                }
                Some(_) => {}
            }
        }

        // expired: drop it unless a writer refreshed it in between
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.get(key).is_some_and(CacheEntry::is_expired) {
            entries.remove(key);
        }
        None
    }

    fn put(&self, key: &str, resolution: Resolution) {
        let entry = CacheEntry {
            resolution: Arc::new(resolution),
            expires_at: Instant::now() + self.ttl,
        };
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), entry);
        if entries.len() > SWEEP_THRESHOLD {
            entries.retain(|_, e| !e.is_expired());
        }
    }

    fn evict(&self, key: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    fn purge(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let count = entries.len();
        entries.clear();
        count
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Cache that stores nothing, used when caching is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl ResolutionCache for NoopCache {
    fn get(&self, _key: &str) -> Option<Arc<Resolution>> {
        None
    }

    fn put(&self, _key: &str, _resolution: Resolution) {}

    fn evict(&self, _key: &str) -> bool {
        false
    }

    fn purge(&self) -> usize {
        0
    }

    fn len(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResolvedLink;

    fn resolution(url: &str) -> Resolution {
        let mut resolution = Resolution::default();
        resolution.push_link(ResolvedLink::new(url, "test"));
        resolution
    }

    #[test]
    fn test_default_cache_ttl() {
        assert_eq!(DEFAULT_CACHE_TTL.as_secs(), 300);
        assert_eq!(InMemoryCache::default().ttl(), DEFAULT_CACHE_TTL);
    }

    #[test]
    fn test_get_after_put() {
        let cache = InMemoryCache::default();
        assert!(cache.get("https://site/ep").is_none());

        cache.put("https://site/ep", resolution("https://cdn/a.mp4"));
        let cached = cache.get("https://site/ep").unwrap();
        assert_eq!(cached.links[0].url, "https://cdn/a.mp4");
        assert_eq!(cache.len(), 1);

        // replacing keeps a single entry
        cache.put("https://site/ep", resolution("https://cdn/b.mp4"));
        assert_eq!(cache.get("https://site/ep").unwrap().links[0].url, "https://cdn/b.mp4");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_expired_entry_is_dropped() {
        let cache = InMemoryCache::new(Duration::from_millis(20));
        cache.put("https://site/ep", resolution("https://cdn/a.mp4"));
        assert!(cache.get("https://site/ep").is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.get("https://site/ep").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_writes_sweep_expired_entries() {
        let cache = InMemoryCache::new(Duration::from_millis(1));
        for i in 0..1000 {
            cache.put(&format!("https://site/ep-{}", i), resolution("https://cdn/a.mp4"));
        }

        std::thread::sleep(Duration::from_millis(5));
        cache.put("https://site/fresh", resolution("https://cdn/b.mp4"));
        assert!(cache.len() <= SWEEP_THRESHOLD);
    }

    #[test]
    fn test_small_cache_is_not_swept_on_write() {
        let cache = InMemoryCache::new(Duration::from_millis(1));
        cache.put("a", resolution("https://cdn/a.mp4"));
        std::thread::sleep(Duration::from_millis(5));
        cache.put("b", resolution("https://cdn/b.mp4"));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_evict_and_purge() {
        let cache = InMemoryCache::default();
        cache.put("a", resolution("https://cdn/a.mp4"));
        cache.put("b", resolution("https://cdn/b.mp4"));
        cache.put("c", resolution("https://cdn/c.mp4"));

        assert!(cache.evict("a"));
        assert!(!cache.evict("a"));
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.purge(), 2);
        assert!(cache.is_empty());
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_noop_cache_stores_nothing() {
        let cache = NoopCache;
        cache.put("a", resolution("https://cdn/a.mp4"));
        assert!(cache.get("a").is_none());
        assert!(!cache.evict("a"));
        assert_eq!(cache.purge(), 0);
        assert!(cache.is_empty());
    }
}
