use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use lru::LruCache;
use parking_lot::RwLock;
use tracing::debug;

use crate::cache::{Cache, CacheEntry, CacheStats};
use crate::clock::{Clock, SystemClock};
use crate::error::{CacheError, Result};

/// Bounded in-memory cache with insertion-order eviction
///
/// Entries are kept in an ordered map. Reads and overwrites never change
/// an entry's position, so when the cache is full the entry inserted
/// earliest is the one evicted (FIFO, not LRU).
pub struct MemoryCache {
    /// Entries in insertion order
    entries: RwLock<LruCache<String, CacheEntry>>,

    /// Maximum number of entries
    max_size: usize,

    /// Time source for expiry
    clock: Arc<dyn Clock>,

    /// Cache hit count
    hits: RwLock<u64>,

    /// Cache miss count
    misses: RwLock<u64>,

    /// Eviction count
    evictions: RwLock<u64>,
}

impl MemoryCache {
    /// Create a new memory cache holding at most `max_size` entries
    pub fn new(max_size: usize) -> Result<Self> {
        Self::with_clock(max_size, Arc::new(SystemClock))
    }

    /// Create a new memory cache using a custom clock
    pub fn with_clock(max_size: usize, clock: Arc<dyn Clock>) -> Result<Self> {
        let capacity = NonZeroUsize::new(max_size).ok_or_else(|| {
            CacheError::InvalidConfiguration("memory cache max_size must be greater than zero".to_string())
        })?;

        Ok(Self {
            entries: RwLock::new(LruCache::new(capacity)),
            max_size,
            clock,
            hits: RwLock::new(0),
            misses: RwLock::new(0),
            evictions: RwLock::new(0),
        })
    }

    /// Get the maximum number of entries
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Keys from oldest to newest insertion
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .rev()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Remove every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }

        expired.len()
    }

    fn record_hit(&self) {
        *self.hits.write() += 1;
        metrics::increment_counter!("tiered_cache_hits_total", "backend" => "memory");
    }

    fn record_miss(&self) {
        *self.misses.write() += 1;
        metrics::increment_counter!("tiered_cache_misses_total", "backend" => "memory");
    }
}

impl Cache for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = self.clock.now();

        let found = self
            .entries
            .read()
            .peek(key)
            .map(|entry| (entry.is_expired_at(now), entry.value.clone()));

        match found {
            None => {
                self.record_miss();
                return None;
            }
            Some((false, value)) => {
                self.record_hit();
                return Some(value);
            }
            Some((true, _)) => {}
        }

        // Expired: re-check under the write lock, a concurrent set may have refreshed it
        let mut entries = self.entries.write();
        let expired = entries.peek(key).map(|entry| entry.is_expired_at(now));
        let value = match expired {
            Some(true) => {
                entries.pop(key);
                debug!(key, "memory cache entry expired");
                None
            }
            Some(false) => entries.peek(key).map(|entry| entry.value.clone()),
            None => None,
        };
        drop(entries);

        match value {
            Some(value) => {
                self.record_hit();
                Some(value)
            }
            None => {
                self.record_miss();
                None
            }
        }
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> bool {
        let entry = CacheEntry::new(key, value, self.clock.now(), ttl);
        let mut entries = self.entries.write();

        // Overwrites keep their insertion position
        if let Some(existing) = entries.peek_mut(key) {
            *existing = entry;
            return true;
        }

        if let Some((evicted, _)) = entries.push(key.to_string(), entry) {
            drop(entries);
            *self.evictions.write() += 1;
            metrics::increment_counter!("tiered_cache_evictions_total", "backend" => "memory");
            debug!(key = %evicted, "evicted oldest memory cache entry");
        }

        true
    }

    fn delete(&self, key: &str) -> bool {
        self.entries.write().pop(key).is_some()
    }

    fn clear(&self) -> bool {
        self.entries.write().clear();
        true
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        let size_bytes = entries.iter().map(|(_, entry)| entry.size() as u64).sum();

        CacheStats {
            hits: *self.hits.read(),
            misses: *self.misses.read(),
            evictions: *self.evictions.read(),
            entries: entries.len(),
            size_bytes,
        }
    }
}
