// Cache backends
//
// Every backend stores opaque byte payloads behind the same four
// operations. Typed values cross the byte boundary through `CacheExt`.

mod entry;
mod memory_cache;
mod disk_cache;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::codec;
use crate::error::CacheError;

// Re-exports
pub use entry::CacheEntry;
pub use memory_cache::MemoryCache;
pub use disk_cache::DiskCache;

/// Capability shared by all cache backends
///
/// Storage failures never escape these methods: a failed read is a miss,
/// a failed write returns `false`.
pub trait Cache: Send + Sync {
    /// Backend label used in logs and metrics
    fn name(&self) -> &'static str;

    /// Get a value if it is present and not expired
    ///
    /// Expired entries are removed as a side effect.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store a value, replacing any existing one (`ttl = None` never expires)
    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> bool;

    /// Remove a value, returning whether one existed
    fn delete(&self, key: &str) -> bool;

    /// Remove every value
    fn clear(&self) -> bool;

    /// Number of stored entries, including expired ones not yet observed
    fn len(&self) -> usize;

    /// Hit, miss and eviction counters
    fn stats(&self) -> CacheStats;

    /// Check if the cache holds no entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if a live value exists for `key`
    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// Typed access on top of the byte-level [`Cache`] operations
pub trait CacheExt: Cache {
    /// Get and decode a value
    ///
    /// A value that fails to decode is deleted and reported as a miss.
    fn get_value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key)?;
        match codec::decode(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(backend = self.name(), key, error = %err, "dropping undecodable cache value");
                self.delete(key);
                None
            }
        }
    }

    /// Encode and store a value
    fn set_value<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        match codec::encode(value) {
            Ok(bytes) => self.set(key, &bytes, ttl),
            Err(err) => {
                warn!(backend = self.name(), key, error = %err, "value could not be encoded for caching");
                false
            }
        }
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}

/// Cache backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    /// Bounded in-memory cache
    Memory,

    /// Size-bounded on-disk cache
    Disk,
}

impl CacheType {
    /// Label used in configuration and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheType::Memory => "memory",
            CacheType::Disk => "disk",
        }
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheType {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheType::Memory),
            "disk" => Ok(CacheType::Disk),
            _ => Err(CacheError::UnknownCacheType(s.to_string())),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads that returned a value
    pub hits: u64,

    /// Reads that returned nothing
    pub misses: u64,

    /// Entries removed to stay within capacity
    pub evictions: u64,

    /// Entries currently stored
    pub entries: usize,

    /// Bytes currently stored
    pub size_bytes: u64,
}

impl CacheStats {
    /// Get the hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;

        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_type_parse() {
        assert_eq!("memory".parse::<CacheType>().unwrap(), CacheType::Memory);
        assert_eq!("Disk".parse::<CacheType>().unwrap(), CacheType::Disk);
        assert!(matches!(
            "redis".parse::<CacheType>(),
            Err(CacheError::UnknownCacheType(name)) if name == "redis"
        ));
        assert_eq!(CacheType::Disk.to_string(), "disk");
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 0.75);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_typed_values() {
        let cache = MemoryCache::new(4).unwrap();

        assert!(cache.set_value("scores", &vec![1.5f32, 2.5], None));
        assert_eq!(cache.get_value::<Vec<f32>>("scores"), Some(vec![1.5, 2.5]));
        assert!(cache.contains("scores"));
    }

    #[test]
    fn test_undecodable_value_is_dropped() {
        let cache = MemoryCache::new(4).unwrap();

        // A lone 251 tag announces a u16 varint that never arrives
        cache.set("broken", &[251], None);
        assert_eq!(cache.get_value::<String>("broken"), None);
        assert!(!cache.contains("broken"));
    }
}
