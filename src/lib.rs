//! # Tiered Cache
//!
//! Tiered Cache is the acceleration layer that sits in front of expensive
//! AI pipeline calls: text embedding, similarity scoring and LLM requests.
//!
//! ## Features
//!
//! - A single `Cache` capability with a bounded in-memory backend and a
//!   size-bounded on-disk backend
//! - Memoization of fallible functions, keyed by a stable hash of their arguments
//! - Content-addressed caching for embeddings and vector similarity
//! - Ordered chunked and parallel batch execution
//! - Per-operation timing statistics
//!
//! Storage problems never surface as errors from cache reads or writes;
//! the cache is a best-effort accelerator and degrades to misses.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tiered_cache::{CacheConfig, CacheManager, CacheType, PerformanceMonitor};
//!
//! let manager = CacheManager::new(CacheConfig::development()).unwrap();
//! let monitor = Arc::new(PerformanceMonitor::new());
//!
//! // Memoize an expensive call in memory
//! let reply = manager
//!     .cached("reply", manager.options(CacheType::Memory), |prompt: &str| {
//!         Ok::<_, std::io::Error>(format!("echo: {}", prompt))
//!     })
//!     .unwrap();
//!
//! // Time it as well
//! let timed_reply = monitor.timed("reply", |prompt: &str| reply.call(prompt));
//!
//! assert_eq!(timed_reply.call("hello").unwrap(), "echo: hello");
//! assert_eq!(timed_reply.call("hello").unwrap(), "echo: hello");
//! assert_eq!(monitor.execution_count("reply"), 2);
//! ```

mod batch;
mod cache;
mod clock;
mod codec;
mod config;
mod error;
mod keys;
mod manager;
mod memoize;
mod monitor;
mod vector;

// Re-export public API
pub use error::{CacheError, Result};
pub use config::{CacheConfig, DEFAULT_CLEANUP_TARGET};
pub use clock::{Clock, ManualClock, SystemClock};
pub use manager::CacheManager;
pub use memoize::{get_or_compute, CacheOptions, Cached};

// Re-export cache API
pub use cache::{
    Cache,
    CacheEntry,
    CacheExt,
    CacheStats,
    CacheType,
    DiskCache,
    MemoryCache,
};

// Re-export vector, batch and monitoring API
pub use vector::{embedding_key, similarity_key, CachedSimilarity, VectorCacheOptimizer};
pub use batch::{BatchError, BatchProcessor};
pub use monitor::{OperationReport, OperationStats, PerformanceMonitor, PerformanceReport, Timed};
pub use keys::{derive_key, hash_bytes};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
