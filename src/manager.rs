use std::collections::BTreeMap;
use std::sync::Arc;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::cache::{Cache, CacheStats, CacheType, DiskCache, MemoryCache};
use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::memoize::{CacheOptions, Cached};

/// Registry of cache backends
///
/// Holds at most one backend per [`CacheType`], built on first request
/// and shared by every caller of this manager. Construct one manager at
/// the service's composition root and pass it around (usually in an
/// `Arc`); separate managers never share backends.
pub struct CacheManager {
    /// Configuration used to build backends
    config: CacheConfig,

    /// Time source handed to every backend
    clock: Arc<dyn Clock>,

    /// Backends built so far
    caches: Mutex<FxHashMap<CacheType, Arc<dyn Cache>>>,
}

impl CacheManager {
    /// Create a manager with the given configuration
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a manager whose backends use a custom clock
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config,
            clock,
            caches: Mutex::new(FxHashMap::default()),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a backend by its label (`"memory"` or `"disk"`)
    pub fn get_cache(&self, cache_type: &str) -> Result<Arc<dyn Cache>> {
        self.cache(cache_type.parse()?)
    }

    /// Get a backend, building it on first use
    ///
    /// The backend is built outside the registry lock; if two callers
    /// race on first use, the first one registered wins.
    pub fn cache(&self, cache_type: CacheType) -> Result<Arc<dyn Cache>> {
        if let Some(cache) = self.caches.lock().get(&cache_type) {
            return Ok(cache.clone());
        }

        let built: Arc<dyn Cache> = match cache_type {
            CacheType::Memory => Arc::new(MemoryCache::with_clock(
                self.config.memory_max_entries,
                self.clock.clone(),
            )?),
            CacheType::Disk => Arc::new(DiskCache::from_config(&self.config, self.clock.clone())?),
        };

        let mut caches = self.caches.lock();
        let cache = caches.entry(cache_type).or_insert_with(|| {
            info!(cache_type = %cache_type, "created cache backend");
            built
        });
        Ok(cache.clone())
    }

    /// Default options for `cache_type`, using the configured TTL
    pub fn options(&self, cache_type: CacheType) -> CacheOptions {
        CacheOptions::new(cache_type).with_ttl(self.config.default_ttl)
    }

    /// Wrap `func` with memoization
    ///
    /// `name` identifies the function in cache keys. The backend is
    /// resolved now, so an unknown or unusable backend fails here rather
    /// than on the first call.
    pub fn cached<A, R, E, F>(&self, name: impl Into<String>, options: CacheOptions, func: F) -> Result<Cached<A, R, F>>
    where
        A: Serialize + ?Sized,
        R: Serialize + DeserializeOwned,
        F: Fn(&A) -> std::result::Result<R, E>,
    {
        let cache = self.cache(options.cache_type)?;
        Ok(Cached::new(cache, name.into(), options, func))
    }

    /// Delete one key from a backend
    pub fn invalidate(&self, cache_type: CacheType, key: &str) -> Result<bool> {
        Ok(self.cache(cache_type)?.delete(key))
    }

    /// Clear every backend built so far
    pub fn clear_all(&self) {
        for cache in self.built() {
            cache.clear();
        }
    }

    /// Statistics for every backend built so far
    pub fn stats(&self) -> BTreeMap<CacheType, CacheStats> {
        let caches = self.caches.lock();
        caches
            .iter()
            .map(|(cache_type, cache)| (*cache_type, cache.stats()))
            .collect()
    }

    fn built(&self) -> Vec<Arc<dyn Cache>> {
        self.caches.lock().values().cloned().collect()
    }
}
