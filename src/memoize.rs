use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{Cache, CacheExt, CacheType};
use crate::keys::derive_key;

/// How a memoized function uses the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Backend holding the results
    pub cache_type: CacheType,

    /// Lifetime of a cached result (None = never expires)
    pub ttl: Option<Duration>,

    /// Prepended to every key
    pub key_prefix: String,

    /// Whether arguments are part of the key
    ///
    /// When false, every call shares one cached result.
    pub hash_args: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            cache_type: CacheType::Memory,
            ttl: None,
            key_prefix: String::new(),
            hash_args: true,
        }
    }
}

impl CacheOptions {
    /// Options for the given backend with no TTL and hashed arguments
    pub fn new(cache_type: CacheType) -> Self {
        Self {
            cache_type,
            ..Default::default()
        }
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the key prefix
    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    /// Set whether arguments are hashed into the key
    pub fn with_hash_args(mut self, hash_args: bool) -> Self {
        self.hash_args = hash_args;
        self
    }
}

/// Return the cached value for `key`, or compute, store and return it
///
/// Errors from `compute` are returned as-is and never cached. A result
/// that cannot be stored is still returned.
pub fn get_or_compute<R, E, F>(cache: &dyn Cache, key: &str, ttl: Option<Duration>, compute: F) -> Result<R, E>
where
    R: Serialize + DeserializeOwned,
    F: FnOnce() -> Result<R, E>,
{
    if let Some(value) = cache.get_value::<R>(key) {
        debug!(backend = cache.name(), key, "cache hit");
        return Ok(value);
    }

    debug!(backend = cache.name(), key, "cache miss");
    let value = compute()?;

    if !cache.set_value(key, &value, ttl) {
        debug!(backend = cache.name(), key, "result not cached");
    }

    Ok(value)
}

/// A function wrapped with memoization
///
/// Built by [`CacheManager::cached`](crate::CacheManager::cached). The
/// wrapped function runs at most once per distinct key per TTL window.
pub struct Cached<A: ?Sized, R, F> {
    cache: Arc<dyn Cache>,
    name: String,
    options: CacheOptions,
    func: F,
    _marker: PhantomData<fn(&A) -> R>,
}

impl<A, R, F> Cached<A, R, F>
where
    A: Serialize + ?Sized,
    R: Serialize + DeserializeOwned,
{
    pub(crate) fn new<E>(cache: Arc<dyn Cache>, name: String, options: CacheOptions, func: F) -> Self
    where
        F: Fn(&A) -> Result<R, E>,
    {
        Self {
            cache,
            name,
            options,
            func,
            _marker: PhantomData,
        }
    }

    /// Function name used in keys
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Options this wrapper was built with
    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Key a call with `args` is cached under
    ///
    /// None if the arguments cannot be encoded, in which case calls
    /// bypass the cache.
    pub fn cache_key(&self, args: &A) -> Option<String> {
        let args = if self.options.hash_args { Some(args) } else { None };

        match derive_key(&self.options.key_prefix, &self.name, args) {
            Ok(key) => Some(key),
            Err(err) => {
                warn!(function = %self.name, error = %err, "arguments could not be hashed, bypassing cache");
                None
            }
        }
    }

    /// Call the wrapped function through the cache
    pub fn call<E>(&self, args: &A) -> Result<R, E>
    where
        F: Fn(&A) -> Result<R, E>,
    {
        match self.cache_key(args) {
            Some(key) => get_or_compute(self.cache.as_ref(), &key, self.options.ttl, || (self.func)(args)),
            None => (self.func)(args),
        }
    }

    /// Drop the cached result for `args`
    pub fn invalidate(&self, args: &A) -> bool {
        match self.cache_key(args) {
            Some(key) => self.cache.delete(&key),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn memory() -> Arc<dyn Cache> {
        Arc::new(MemoryCache::new(100).unwrap())
    }

    #[test]
    fn test_get_or_compute() {
        let cache = memory();
        let calls = AtomicUsize::new(0);

        let compute = || -> Result<u32, ()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        };

        assert_eq!(get_or_compute(cache.as_ref(), "k", None, compute), Ok(42));
        assert_eq!(get_or_compute(cache.as_ref(), "k", None, compute), Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = memory();
        let calls = AtomicUsize::new(0);

        let failing = || -> Result<u32, String> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("provider unavailable".to_string())
        };

        assert!(get_or_compute(cache.as_ref(), "k", None, failing).is_err());
        assert!(get_or_compute(cache.as_ref(), "k", None, failing).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cached_keys() {
        let options = CacheOptions::default().with_key_prefix("llm:");
        let cached = Cached::new(memory(), "reply".to_string(), options, |p: &str| -> Result<String, ()> {
            Ok(p.to_uppercase())
        });

        let a = cached.cache_key("hi").unwrap();
        let b = cached.cache_key("bye").unwrap();
        assert!(a.starts_with("llm:reply:"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_args_false_collapses_calls() {
        let calls = AtomicUsize::new(0);
        let options = CacheOptions::default().with_hash_args(false);
        let cached = Cached::new(memory(), "config".to_string(), options, |n: &u32| -> Result<u32, ()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(*n)
        });

        assert_eq!(cached.cache_key(&1), Some("config".to_string()));
        assert_eq!(cached.call(&1), Ok(1));
        // Different argument, same key: the first result comes back
        assert_eq!(cached.call(&2), Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalidate() {
        let calls = AtomicUsize::new(0);
        let cached = Cached::new(memory(), "f".to_string(), CacheOptions::default(), |n: &u32| -> Result<u32, ()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(n * 2)
        });

        cached.call(&3).unwrap();
        assert!(cached.invalidate(&3));
        cached.call(&3).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
