use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use thiserror::Error;
use tracing::trace;

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

/// Failure of one item in a fail-fast batch
#[derive(Error, Debug)]
#[error("batch item {index} failed: {error}")]
pub struct BatchError<E> {
    /// Position of the failing item in the input
    pub index: usize,

    /// Error returned by the operation
    pub error: E,
}

/// Applies an operation over a collection in chunks or in parallel
///
/// Results always come back in input order. Parallel work runs on a
/// dedicated pool of `max_workers` threads, independent of `batch_size`.
///
/// Error policy: `map_parallel` keeps every per-item outcome (an
/// operation returning `Result` yields one `Result` per input), while the
/// `try_*` methods stop scheduling work at the first failure and report
/// the failing item's index.
pub struct BatchProcessor {
    batch_size: usize,
    max_workers: usize,
    pool: ThreadPool,
}

impl BatchProcessor {
    /// Create a processor with one worker per available core
    pub fn new(batch_size: usize) -> Result<Self> {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self::with_workers(batch_size, workers)
    }

    /// Create a processor with an explicit worker count
    pub fn with_workers(batch_size: usize, max_workers: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(CacheError::InvalidConfiguration(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if max_workers == 0 {
            return Err(CacheError::InvalidConfiguration(
                "max_workers must be greater than zero".to_string(),
            ));
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|i| format!("batch-worker-{}", i))
            .build()?;

        Ok(Self {
            batch_size,
            max_workers,
            pool,
        })
    }

    /// Create a processor from the configuration
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::with_workers(config.batch_size, config.max_workers)
    }

    /// Get the chunk size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Get the worker count
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Apply `operation` to every item, one chunk at a time
    pub fn process_batch<T, R, F>(&self, items: &[T], operation: F) -> Vec<R>
    where
        F: Fn(&T) -> R,
    {
        let mut results = Vec::with_capacity(items.len());

        for (n, chunk) in items.chunks(self.batch_size).enumerate() {
            trace!(chunk = n, len = chunk.len(), "processing batch chunk");
            results.extend(chunk.iter().map(&operation));
        }

        results
    }

    /// Apply a fallible `operation`, stopping at the first failure
    pub fn try_process_batch<T, R, E, F>(&self, items: &[T], operation: F) -> std::result::Result<Vec<R>, BatchError<E>>
    where
        F: Fn(&T) -> std::result::Result<R, E>,
    {
        let mut results = Vec::with_capacity(items.len());

        for (n, chunk) in items.chunks(self.batch_size).enumerate() {
            let offset = n * self.batch_size;
            for (i, item) in chunk.iter().enumerate() {
                let result = operation(item).map_err(|error| BatchError {
                    index: offset + i,
                    error,
                })?;
                results.push(result);
            }
        }

        Ok(results)
    }

    /// Apply an operation that handles a whole chunk at once
    ///
    /// For batch APIs such as bulk embedding endpoints. The operation
    /// must return exactly one result per item it was given.
    pub fn process_chunks<T, R, F>(&self, items: &[T], operation: F) -> Result<Vec<R>>
    where
        F: Fn(&[T]) -> Vec<R>,
    {
        let mut results = Vec::with_capacity(items.len());

        for chunk in items.chunks(self.batch_size) {
            let chunk_results = operation(chunk);
            if chunk_results.len() != chunk.len() {
                return Err(CacheError::ChunkLengthMismatch {
                    expected: chunk.len(),
                    actual: chunk_results.len(),
                });
            }
            results.extend(chunk_results);
        }

        Ok(results)
    }

    /// Apply `operation` to every item on the worker pool
    ///
    /// Execution order is unspecified; the returned results follow the
    /// input order. Every item runs, so fallible operations yield one
    /// `Result` per input.
    pub fn map_parallel<T, R, F>(&self, items: &[T], operation: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        self.pool.install(|| items.par_iter().map(&operation).collect())
    }

    /// Apply a fallible `operation` on the worker pool, failing fast
    ///
    /// Once an item fails no further items are started; items already
    /// running complete. With several failures, which one is reported is
    /// unspecified.
    pub fn try_map_parallel<T, R, E, F>(&self, items: &[T], operation: F) -> std::result::Result<Vec<R>, BatchError<E>>
    where
        T: Sync,
        R: Send,
        E: Send,
        F: Fn(&T) -> std::result::Result<R, E> + Sync + Send,
    {
        self.pool.install(|| {
            items
                .par_iter()
                .enumerate()
                .map(|(index, item)| operation(item).map_err(|error| BatchError { index, error }))
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn square(n: &u64) -> u64 {
        n * n
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(matches!(
            BatchProcessor::new(0),
            Err(CacheError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            BatchProcessor::with_workers(4, 0),
            Err(CacheError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_process_batch_keeps_order_for_any_chunk_size() {
        let items = [1u64, 2, 3, 4, 5];

        for batch_size in 1..=6 {
            let processor = BatchProcessor::with_workers(batch_size, 2).unwrap();
            assert_eq!(processor.process_batch(&items, square), vec![1, 4, 9, 16, 25]);
        }
    }

    #[test]
    fn test_process_batch_empty() {
        let processor = BatchProcessor::with_workers(3, 1).unwrap();
        let empty: [u64; 0] = [];
        assert!(processor.process_batch(&empty, square).is_empty());
        assert!(processor.map_parallel(&empty, square).is_empty());
    }

    #[test]
    fn test_try_process_batch_reports_index_and_stops() {
        let processor = BatchProcessor::with_workers(2, 1).unwrap();
        let calls = AtomicUsize::new(0);

        let result = processor.try_process_batch(&[1, 2, 3, 4, 5], |n: &i32| {
            calls.fetch_add(1, Ordering::SeqCst);
            if *n == 3 {
                Err("bad item")
            } else {
                Ok(n * 10)
            }
        });

        let err = result.unwrap_err();
        assert_eq!(err.index, 2);
        assert_eq!(err.error, "bad item");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_process_chunks() {
        let processor = BatchProcessor::with_workers(2, 1).unwrap();
        let chunk_sizes = parking_lot::Mutex::new(Vec::new());

        let results = processor
            .process_chunks(&[1, 2, 3, 4, 5], |chunk: &[i32]| {
                chunk_sizes.lock().push(chunk.len());
                chunk.iter().map(|n| n + 1).collect::<Vec<_>>()
            })
            .unwrap();

        assert_eq!(results, vec![2, 3, 4, 5, 6]);
        assert_eq!(*chunk_sizes.lock(), vec![2, 2, 1]);
    }

    #[test]
    fn test_process_chunks_length_mismatch() {
        let processor = BatchProcessor::with_workers(2, 1).unwrap();

        let result = processor.process_chunks(&[1, 2, 3], |chunk: &[i32]| vec![chunk[0]]);
        assert!(matches!(
            result,
            Err(CacheError::ChunkLengthMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_map_parallel_keeps_order() {
        let processor = BatchProcessor::with_workers(2, 4).unwrap();
        assert_eq!(processor.map_parallel(&[1u64, 2, 3, 4, 5], square), vec![1, 4, 9, 16, 25]);

        let items: Vec<u64> = (0..1_000).collect();
        let expected: Vec<u64> = items.iter().map(square).collect();
        assert_eq!(processor.map_parallel(&items, square), expected);
    }

    #[test]
    fn test_map_parallel_collects_every_failure() {
        let processor = BatchProcessor::with_workers(2, 4).unwrap();

        let results = processor.map_parallel(&[1, 2, 3, 4], |n: &i32| {
            if n % 2 == 0 {
                Err(format!("{} is even", n))
            } else {
                Ok(*n)
            }
        });

        assert_eq!(
            results,
            vec![Ok(1), Err("2 is even".to_string()), Ok(3), Err("4 is even".to_string())]
        );
    }

    #[test]
    fn test_try_map_parallel() {
        let processor = BatchProcessor::with_workers(2, 4).unwrap();

        let ok: std::result::Result<Vec<i32>, BatchError<String>> =
            processor.try_map_parallel(&[1, 2, 3], |n: &i32| Ok(n * 2));
        assert_eq!(ok.unwrap(), vec![2, 4, 6]);

        let err = processor
            .try_map_parallel(&[1, 2, 3, 4], |n: &i32| if *n == 3 { Err("three") } else { Ok(*n) })
            .unwrap_err();
        assert_eq!(err.index, 2);
        assert_eq!(err.to_string(), "batch item 2 failed: three");
    }

    #[test]
    fn test_map_parallel_bounded_workers() {
        let processor = BatchProcessor::with_workers(1, 2).unwrap();
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        processor.map_parallel(&[0; 32], |_: &i32| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(2));
            active.fetch_sub(1, Ordering::SeqCst);
        });

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
