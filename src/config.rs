use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use bytesize::ByteSize;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// Fraction of the disk limit a cleanup pass shrinks the cache to
pub const DEFAULT_CLEANUP_TARGET: f64 = 0.8;

/// Cache layer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries held by the memory cache
    pub memory_max_entries: usize,

    /// Directory owned by the disk cache
    pub disk_path: PathBuf,

    /// Maximum aggregate size of the disk cache
    pub disk_max_size: ByteSize,

    /// Fraction of `disk_max_size` a cleanup pass shrinks the cache to
    pub disk_cleanup_target: f64,

    /// TTL used by `CacheManager::options` (None = never expires)
    pub default_ttl: Option<Duration>,

    /// TTL for embedding and similarity results
    pub vector_ttl: Option<Duration>,

    /// Chunk size for batch processing
    pub batch_size: usize,

    /// Worker threads for parallel batch processing
    pub max_workers: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_max_entries: 1000,
            disk_path: std::env::temp_dir().join(".cache").join("tiered_cache"),
            disk_max_size: ByteSize::mib(100),
            disk_cleanup_target: DEFAULT_CLEANUP_TARGET,
            default_ttl: Some(Duration::from_secs(3600)),
            vector_ttl: Some(Duration::from_secs(24 * 3600)),
            batch_size: 32,
            max_workers: default_workers(),
        }
    }
}

impl CacheConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the memory cache capacity
    pub fn with_memory_max_entries(mut self, max_entries: usize) -> Self {
        self.memory_max_entries = max_entries;
        self
    }

    /// Set the disk cache directory
    pub fn with_disk_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.disk_path = path.as_ref().to_path_buf();
        self
    }

    /// Set the disk cache size limit
    pub fn with_disk_max_size(mut self, max_size: ByteSize) -> Self {
        self.disk_max_size = max_size;
        self
    }

    /// Set the cleanup target as a fraction of the disk size limit
    pub fn with_disk_cleanup_target(mut self, target: f64) -> Self {
        self.disk_cleanup_target = target;
        self
    }

    /// Set the default TTL
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the TTL for vector results
    pub fn with_vector_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.vector_ttl = ttl;
        self
    }

    /// Set the batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the number of parallel workers
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Check every setting, failing on the first invalid one
    pub fn validate(&self) -> Result<()> {
        if self.memory_max_entries == 0 {
            return Err(CacheError::InvalidConfiguration(
                "memory_max_entries must be greater than zero".to_string(),
            ));
        }
        if self.disk_max_size.as_u64() == 0 {
            return Err(CacheError::InvalidConfiguration(
                "disk_max_size must be greater than zero".to_string(),
            ));
        }
        validate_cleanup_target(self.disk_cleanup_target)?;
        validate_ttl("default_ttl", self.default_ttl)?;
        validate_ttl("vector_ttl", self.vector_ttl)?;
        if self.batch_size == 0 {
            return Err(CacheError::InvalidConfiguration(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.max_workers == 0 {
            return Err(CacheError::InvalidConfiguration(
                "max_workers must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: CacheConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a JSON file
    pub fn save_to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Create a development configuration with small caches and short TTLs
    pub fn development() -> Self {
        Self {
            memory_max_entries: 100,
            disk_max_size: ByteSize::mib(10),
            default_ttl: Some(Duration::from_secs(300)),
            vector_ttl: Some(Duration::from_secs(3600)),
            ..Default::default()
        }
    }

    /// Create a production configuration with larger caches
    pub fn production() -> Self {
        Self {
            memory_max_entries: 10_000,
            disk_max_size: ByteSize::gib(1),
            batch_size: 64,
            ..Default::default()
        }
    }

    /// Create a low-memory configuration for resource-constrained environments
    pub fn low_memory() -> Self {
        Self {
            memory_max_entries: 100,
            disk_max_size: ByteSize::mib(20),
            disk_cleanup_target: 0.6, // Trim harder to leave headroom
            batch_size: 8,
            max_workers: 2,
            ..Default::default()
        }
    }
}

pub(crate) fn validate_cleanup_target(target: f64) -> Result<()> {
    if target > 0.0 && target <= 1.0 {
        Ok(())
    } else {
        Err(CacheError::InvalidConfiguration(format!(
            "disk_cleanup_target must be in (0, 1], got {}",
            target
        )))
    }
}

fn validate_ttl(name: &str, ttl: Option<Duration>) -> Result<()> {
    match ttl {
        Some(ttl) if ttl.is_zero() => Err(CacheError::InvalidConfiguration(format!(
            "{} must be greater than zero when set",
            name
        ))),
        _ => Ok(()),
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
