// Content-addressed caching for embedding and similarity functions
//
// Embeddings are pure functions of their input text, so they are keyed by
// a digest of the text (and the model that produced them) rather than by
// any caller-supplied identifier.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, CacheType};
use crate::error::Result;
use crate::keys::{derive_key, hash_vector};
use crate::manager::CacheManager;
use crate::memoize::{get_or_compute, CacheOptions, Cached};

const EMBEDDING_PREFIX: &str = "embedding:";
const SIMILARITY_PREFIX: &str = "similarity:";

/// Key for the embedding of `text` produced by `model`
///
/// `embedding:<model>:<digest>`, the key [`VectorCacheOptimizer::cached_embedding`] stores under.
pub fn embedding_key(model: &str, text: &str) -> Result<String> {
    derive_key(EMBEDDING_PREFIX, model, Some(text))
}

/// Key for the similarity of two vectors under `model`
///
/// The two vector digests are ordered, so `(a, b)` and `(b, a)` share a key.
pub fn similarity_key(model: &str, a: &[f32], b: &[f32]) -> String {
    let (ha, hb) = (hash_vector(a), hash_vector(b));
    let (low, high) = if ha <= hb { (ha, hb) } else { (hb, ha) };
    format!("{}{}:{}:{}", SIMILARITY_PREFIX, model, low, high)
}

/// Memoizes embedding and similarity functions by content
pub struct VectorCacheOptimizer {
    manager: Arc<CacheManager>,
    cache: Arc<dyn Cache>,
    cache_type: CacheType,
    ttl: Option<Duration>,
}

impl VectorCacheOptimizer {
    /// Cache vectors in memory with the configured vector TTL
    pub fn new(manager: Arc<CacheManager>) -> Result<Self> {
        let ttl = manager.config().vector_ttl;
        Self::with_options(manager, CacheType::Memory, ttl)
    }

    /// Cache vectors in the given backend with an explicit TTL
    pub fn with_options(manager: Arc<CacheManager>, cache_type: CacheType, ttl: Option<Duration>) -> Result<Self> {
        let cache = manager.cache(cache_type)?;

        Ok(Self {
            manager,
            cache,
            cache_type,
            ttl,
        })
    }

    /// Backend holding the vectors
    pub fn cache_type(&self) -> CacheType {
        self.cache_type
    }

    /// TTL applied to cached vectors
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Wrap an embedding function so identical texts reuse one result
    pub fn cached_embedding<E, F>(&self, model: &str, embed: F) -> Result<Cached<str, Vec<f32>, F>>
    where
        F: Fn(&str) -> std::result::Result<Vec<f32>, E>,
    {
        let options = CacheOptions::new(self.cache_type)
            .with_ttl(self.ttl)
            .with_key_prefix(EMBEDDING_PREFIX)
            .with_hash_args(true);
        self.manager.cached(model, options, embed)
    }

    /// Wrap a similarity function so identical vector pairs reuse one score
    pub fn cached_similarity<F>(&self, model: &str, similarity: F) -> CachedSimilarity<F> {
        CachedSimilarity {
            cache: self.cache.clone(),
            model: model.to_string(),
            ttl: self.ttl,
            func: similarity,
        }
    }

    /// Get the embedding of `text`, computing it on a miss
    ///
    /// Shares entries with [`cached_embedding`](Self::cached_embedding)
    /// for the same model.
    pub fn get_or_embed<E, F>(&self, model: &str, text: &str, embed: F) -> std::result::Result<Vec<f32>, E>
    where
        F: FnOnce(&str) -> std::result::Result<Vec<f32>, E>,
    {
        match embedding_key(model, text) {
            Ok(key) => get_or_compute(self.cache.as_ref(), &key, self.ttl, || embed(text)),
            Err(_) => embed(text),
        }
    }

    /// Get the similarity of two vectors, computing it on a miss
    pub fn get_or_similarity<E, F>(&self, model: &str, a: &[f32], b: &[f32], similarity: F) -> std::result::Result<f32, E>
    where
        F: FnOnce(&[f32], &[f32]) -> std::result::Result<f32, E>,
    {
        let key = similarity_key(model, a, b);
        get_or_compute(self.cache.as_ref(), &key, self.ttl, || similarity(a, b))
    }
}

/// A similarity function wrapped with content-addressed caching
pub struct CachedSimilarity<F> {
    cache: Arc<dyn Cache>,
    model: String,
    ttl: Option<Duration>,
    func: F,
}

impl<F> CachedSimilarity<F> {
    /// Score two vectors through the cache
    pub fn call<E>(&self, a: &[f32], b: &[f32]) -> std::result::Result<f32, E>
    where
        F: Fn(&[f32], &[f32]) -> std::result::Result<f32, E>,
    {
        let key = similarity_key(&self.model, a, b);
        get_or_compute(self.cache.as_ref(), &key, self.ttl, || (self.func)(a, b))
    }
}
