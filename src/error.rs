use thiserror::Error;
use std::io;

/// Custom error types for the tiered cache library
#[derive(Error, Debug)]
pub enum CacheError {
    /// Requested a cache backend that does not exist
    #[error("Unknown cache type: {0} (expected \"memory\" or \"disk\")")]
    UnknownCacheType(String),

    /// Invalid size, TTL or worker settings
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Error while encoding a value
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error while decoding a value
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// JSON error while loading or saving configuration and reports
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error during file operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The batch worker pool could not be built
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// A chunk operation returned a different number of results than it was given
    #[error("Chunk operation returned {actual} results for {expected} items")]
    ChunkLengthMismatch { expected: usize, actual: usize },
}

impl From<bincode::error::EncodeError> for CacheError {
    fn from(err: bincode::error::EncodeError) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for CacheError {
    fn from(err: bincode::error::DecodeError) -> Self {
        CacheError::Deserialization(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for CacheError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        CacheError::ThreadPool(err.to_string())
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
