use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use bytesize::ByteSize;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::cache::entry::is_expired;
use crate::cache::{Cache, CacheEntry, CacheStats};
use crate::clock::{Clock, SystemClock};
use crate::config::{validate_cleanup_target, CacheConfig, DEFAULT_CLEANUP_TARGET};
use crate::error::{CacheError, Result};
use crate::keys::hash_bytes;

const ENTRY_EXTENSION: &str = "bin";
const TMP_EXTENSION: &str = "tmp";

/// Index record for one file on disk
#[derive(Debug, Clone)]
struct IndexEntry {
    path: PathBuf,
    size: u64,
    created_at: SystemTime,
    expires_at: Option<SystemTime>,
    /// Insertion sequence, breaks ties between equal timestamps
    seq: u64,
}

/// In-memory view of the cache directory
#[derive(Debug, Default)]
struct DiskIndex {
    entries: FxHashMap<String, IndexEntry>,
    total_size: u64,
    next_seq: u64,
}

impl DiskIndex {
    fn insert(&mut self, key: String, mut meta: IndexEntry) {
        meta.seq = self.next_seq;
        self.next_seq += 1;
        self.total_size += meta.size;

        if let Some(old) = self.entries.insert(key, meta) {
            self.total_size = self.total_size.saturating_sub(old.size);
        }
    }

    fn remove(&mut self, key: &str) -> Option<IndexEntry> {
        let meta = self.entries.remove(key)?;
        self.total_size = self.total_size.saturating_sub(meta.size);
        Some(meta)
    }

    /// Drop `key` from the index and delete its file
    fn discard(&mut self, key: &str) {
        if let Some(meta) = self.remove(key) {
            remove_file_quietly(&meta.path);
        }
    }
}

enum Lookup {
    Found(Vec<u8>),
    Missing,
    Stale(u64),
}

/// Size-bounded on-disk cache
///
/// Each key is stored as one self-describing file named after the SHA-256
/// of the key. An in-memory index tracks expiry and the aggregate size;
/// when a write pushes the size over `max_size`, the oldest entries are
/// removed until the size is back at or below the cleanup target.
pub struct DiskCache {
    /// Cache directory
    dir: PathBuf,

    /// Maximum aggregate size
    max_size: ByteSize,

    /// Size a cleanup pass shrinks the cache to
    target_size: u64,

    /// Key index and aggregate size
    index: RwLock<DiskIndex>,

    /// Time source for expiry
    clock: Arc<dyn Clock>,

    /// Cache hit count
    hits: RwLock<u64>,

    /// Cache miss count
    misses: RwLock<u64>,

    /// Eviction count
    evictions: RwLock<u64>,
}

impl DiskCache {
    /// Open (or create) a disk cache in `dir`
    pub fn open<P: AsRef<Path>>(dir: P, max_size: ByteSize) -> Result<Self> {
        Self::open_with(dir, max_size, DEFAULT_CLEANUP_TARGET, Arc::new(SystemClock))
    }

    /// Open a disk cache from the configuration
    pub fn from_config(config: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::open_with(
            &config.disk_path,
            config.disk_max_size,
            config.disk_cleanup_target,
            clock,
        )
    }

    /// Open a disk cache with an explicit cleanup target and clock
    ///
    /// Existing entry files are indexed; corrupt, expired and stray
    /// temporary files are deleted.
    pub fn open_with<P: AsRef<Path>>(
        dir: P,
        max_size: ByteSize,
        cleanup_target: f64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if max_size.as_u64() == 0 {
            return Err(CacheError::InvalidConfiguration(
                "disk cache max_size must be greater than zero".to_string(),
            ));
        }
        validate_cleanup_target(cleanup_target)?;

        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let cache = Self {
            target_size: (max_size.as_u64() as f64 * cleanup_target) as u64,
            dir,
            max_size,
            index: RwLock::new(DiskIndex::default()),
            clock,
            hits: RwLock::new(0),
            misses: RwLock::new(0),
            evictions: RwLock::new(0),
        };

        let loaded = cache.load_index()?;
        {
            let mut index = cache.index.write();
            *index = loaded;
            if index.total_size > cache.max_size.as_u64() {
                cache.cleanup_locked(&mut index);
            }
            info!(
                path = %cache.dir.display(),
                entries = index.entries.len(),
                size = %ByteSize::b(index.total_size),
                "opened disk cache"
            );
        }

        Ok(cache)
    }

    /// Get the cache directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// File that holds the entry for `key`
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", hash_bytes(key.as_bytes()), ENTRY_EXTENSION))
    }

    /// Get the current aggregate size
    pub fn size(&self) -> ByteSize {
        ByteSize::b(self.index.read().total_size)
    }

    /// Get the maximum aggregate size
    pub fn max_size(&self) -> ByteSize {
        self.max_size
    }

    /// Get the size a cleanup pass shrinks the cache to
    pub fn target_size(&self) -> ByteSize {
        ByteSize::b(self.target_size)
    }

    /// Remove oldest entries until the size is at or below the target
    ///
    /// Returns the number of entries removed.
    pub fn cleanup(&self) -> usize {
        let mut index = self.index.write();
        self.cleanup_locked(&mut index)
    }

    /// Remove every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut index = self.index.write();

        let expired: Vec<String> = index
            .entries
            .iter()
            .filter(|(_, meta)| is_expired(meta.expires_at, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            if let Some(meta) = index.remove(key) {
                remove_file_quietly(&meta.path);
            }
        }

        expired.len()
    }

    fn load_index(&self) -> Result<DiskIndex> {
        let now = self.clock.now();
        let mut found = Vec::new();

        for item in fs::read_dir(&self.dir)? {
            let item = match item {
                Ok(item) => item,
                Err(err) => {
                    warn!(path = %self.dir.display(), error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };

            let path = item.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some(TMP_EXTENSION) => {
                    remove_file_quietly(&path);
                    continue;
                }
                Some(ENTRY_EXTENSION) => {}
                _ => continue,
            }

            match read_entry(&path) {
                Ok((entry, size)) => {
                    if entry.is_expired_at(now) || self.entry_path(&entry.key) != path {
                        remove_file_quietly(&path);
                    } else {
                        found.push((entry, size));
                    }
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "removing corrupt cache file");
                    remove_file_quietly(&path);
                }
            }
        }

        // Oldest first, so insertion sequence follows age
        found.sort_by_key(|(entry, _)| entry.created_at);

        let mut index = DiskIndex::default();
        for (entry, size) in found {
            let meta = IndexEntry {
                path: self.entry_path(&entry.key),
                size,
                created_at: entry.created_at,
                expires_at: entry.expires_at,
                seq: 0,
            };
            index.insert(entry.key, meta);
        }

        Ok(index)
    }

    fn cleanup_locked(&self, index: &mut DiskIndex) -> usize {
        if index.total_size <= self.target_size {
            return 0;
        }

        let mut by_age: Vec<(SystemTime, u64, String)> = index
            .entries
            .iter()
            .map(|(key, meta)| (meta.created_at, meta.seq, key.clone()))
            .collect();
        by_age.sort();

        let before = index.total_size;
        let mut removed = 0;

        for (_, _, key) in by_age {
            if index.total_size <= self.target_size {
                break;
            }
            if let Some(meta) = index.remove(&key) {
                remove_file_quietly(&meta.path);
                removed += 1;
            }
        }

        *self.evictions.write() += removed as u64;
        metrics::counter!("tiered_cache_evictions_total", removed as u64, "backend" => "disk");
        metrics::gauge!("tiered_cache_disk_bytes", index.total_size as f64);
        info!(
            removed,
            freed = %ByteSize::b(before - index.total_size),
            size = %ByteSize::b(index.total_size),
            "disk cache cleanup"
        );

        removed
    }

    /// Drop an index entry unless a concurrent write replaced it
    fn remove_if_current(&self, key: &str, seq: u64) {
        let mut index = self.index.write();

        let current = index.entries.get(key).map(|meta| meta.seq) == Some(seq);
        if current {
            index.discard(key);
        }
    }

    fn record_hit(&self) {
        *self.hits.write() += 1;
        metrics::increment_counter!("tiered_cache_hits_total", "backend" => "disk");
    }

    fn record_miss(&self) {
        *self.misses.write() += 1;
        metrics::increment_counter!("tiered_cache_misses_total", "backend" => "disk");
    }
}

impl Cache for DiskCache {
    fn name(&self) -> &'static str {
        "disk"
    }

    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = self.clock.now();

        let lookup = {
            let index = self.index.read();
            match index.entries.get(key) {
                None => Lookup::Missing,
                Some(meta) if is_expired(meta.expires_at, now) => {
                    debug!(key, "disk cache entry expired");
                    Lookup::Stale(meta.seq)
                }
                Some(meta) => match read_entry(&meta.path) {
                    Ok((entry, _)) if entry.key == key => Lookup::Found(entry.value),
                    Ok(_) => {
                        warn!(key, "disk cache file holds a different key");
                        Lookup::Stale(meta.seq)
                    }
                    Err(err) => {
                        warn!(key, error = %err, "unreadable disk cache entry treated as a miss");
                        Lookup::Stale(meta.seq)
                    }
                },
            }
        };

        match lookup {
            Lookup::Found(value) => {
                self.record_hit();
                Some(value)
            }
            Lookup::Missing => {
                self.record_miss();
                None
            }
            Lookup::Stale(seq) => {
                self.remove_if_current(key, seq);
                self.record_miss();
                None
            }
        }
    }

    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> bool {
        let entry = CacheEntry::new(key, value, self.clock.now(), ttl);
        let bytes = match entry.to_bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(key, error = %err, "disk cache entry could not be encoded");
                self.index.write().discard(key);
                return false;
            }
        };

        let size = bytes.len() as u64;
        let path = self.entry_path(key);
        let mut index = self.index.write();

        // A failed write leaves no previous value behind
        if size > self.target_size {
            warn!(key, size = %ByteSize::b(size), "value larger than the disk cache target size");
            index.discard(key);
            return false;
        }

        if let Err(err) = write_atomic(&path, &bytes) {
            warn!(key, path = %path.display(), error = %err, "disk cache write failed");
            index.discard(key);
            return false;
        }

        index.insert(
            key.to_string(),
            IndexEntry {
                path,
                size,
                created_at: entry.created_at,
                expires_at: entry.expires_at,
                seq: 0,
            },
        );

        if index.total_size > self.max_size.as_u64() {
            self.cleanup_locked(&mut index);
        }

        true
    }

    fn delete(&self, key: &str) -> bool {
        let mut index = self.index.write();

        match index.remove(key) {
            Some(meta) => {
                remove_file_quietly(&meta.path);
                true
            }
            None => false,
        }
    }

    fn clear(&self) -> bool {
        let mut index = self.index.write();

        match fs::read_dir(&self.dir) {
            Ok(items) => {
                for item in items.flatten() {
                    let path = item.path();
                    if path.is_file() {
                        remove_file_quietly(&path);
                    }
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %self.dir.display(), error = %err, "could not list disk cache directory");
            }
        }

        *index = DiskIndex::default();
        metrics::gauge!("tiered_cache_disk_bytes", 0.0);
        true
    }

    fn len(&self) -> usize {
        self.index.read().entries.len()
    }

    fn stats(&self) -> CacheStats {
        let index = self.index.read();

        CacheStats {
            hits: *self.hits.read(),
            misses: *self.misses.read(),
            evictions: *self.evictions.read(),
            entries: index.entries.len(),
            size_bytes: index.total_size,
        }
    }
}

fn read_entry(path: &Path) -> Result<(CacheEntry, u64)> {
    let bytes = fs::read(path)?;
    let entry = CacheEntry::from_bytes(&bytes)?;
    Ok((entry, bytes.len() as u64))
}

/// Write through a temporary file so readers never see a partial entry
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension(TMP_EXTENSION);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path).map_err(|err| {
        remove_file_quietly(&tmp);
        err
    })
}

fn remove_file_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "could not remove cache file");
        }
    }
}
