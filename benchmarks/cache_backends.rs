//! Cache backend comparison benchmark
//!
//! Runs the same seeded read/write workload against the memory and disk
//! backends and reports throughput, hit rate and evictions.

use std::time::{Duration, Instant};
use bytesize::ByteSize;
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tiered_cache::{CacheConfig, CacheManager, CacheType, PerformanceMonitor};

/// Benchmark configuration
struct BenchmarkConfig {
    /// Number of distinct keys
    key_count: usize,

    /// Average value size in bytes
    avg_value_size: usize,

    /// Number of operations to run after the initial fill
    op_count: usize,

    /// Fraction of operations that are reads
    read_percentage: f64,

    /// Random seed for reproducibility
    seed: u64,

    /// Memory cache capacity in entries
    memory_max_entries: usize,

    /// Disk cache size limit
    disk_max_size: ByteSize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            key_count: 5_000,
            avg_value_size: 1_000,
            op_count: 50_000,
            read_percentage: 0.8,
            seed: 42,
            memory_max_entries: 2_500,
            disk_max_size: ByteSize::mib(4),
        }
    }
}

/// Benchmark results for a single backend
struct BenchmarkResult {
    cache_type: CacheType,
    insert_throughput: f64,
    read_throughput: f64,
    write_throughput: f64,
    hit_rate: f64,
    evictions: u64,
    final_size: ByteSize,
    duration: Duration,
}

fn run_benchmark(config: &BenchmarkConfig) -> Vec<BenchmarkResult> {
    let mut results = Vec::new();

    for cache_type in [CacheType::Memory, CacheType::Disk] {
        println!("Benchmarking cache type: {}", cache_type);

        let temp_dir = tempfile::tempdir().expect("Failed to create temporary directory");
        let cache_config = CacheConfig::new()
            .with_memory_max_entries(config.memory_max_entries)
            .with_disk_path(temp_dir.path())
            .with_disk_max_size(config.disk_max_size);
        let manager = CacheManager::new(cache_config).expect("Failed to create cache manager");
        let cache = manager.cache(cache_type).expect("Failed to create cache");
        let monitor = PerformanceMonitor::new();

        let mut rng = StdRng::seed_from_u64(config.seed);
        let start_time = Instant::now();

        for i in 0..config.key_count {
            let key = format!("key:{}", i);
            let value = generate_random_value(&mut rng, config.avg_value_size);
            monitor.time("insert", || cache.set(&key, &value, None));
        }

        for _ in 0..config.op_count {
            let key = format!("key:{}", rng.gen_range(0..config.key_count));

            if rng.gen_bool(config.read_percentage) {
                monitor.time("read", || cache.get(&key));
            } else {
                let value = generate_random_value(&mut rng, config.avg_value_size);
                monitor.time("write", || cache.set(&key, &value, None));
            }
        }

        let stats = cache.stats();
        let result = BenchmarkResult {
            cache_type,
            insert_throughput: throughput(&monitor, "insert"),
            read_throughput: throughput(&monitor, "read"),
            write_throughput: throughput(&monitor, "write"),
            hit_rate: stats.hit_rate(),
            evictions: stats.evictions,
            final_size: ByteSize::b(stats.size_bytes),
            duration: start_time.elapsed(),
        };

        println!("  Insert throughput: {:.2} ops/sec", result.insert_throughput);
        println!("  Read throughput: {:.2} ops/sec", result.read_throughput);
        println!("  Write throughput: {:.2} ops/sec", result.write_throughput);
        println!("  Hit rate: {:.3}", result.hit_rate);
        println!("  Evictions: {}", result.evictions);
        println!("  Final size: {}", result.final_size);
        println!("  Total duration: {:?}", result.duration);
        println!();

        results.push(result);
    }

    results
}

fn throughput(monitor: &PerformanceMonitor, operation: &str) -> f64 {
    match monitor.stats(operation) {
        Some(stats) if !stats.total_time.is_zero() => stats.count as f64 / stats.total_time.as_secs_f64(),
        _ => 0.0,
    }
}

/// Generate a random value around the specified size
fn generate_random_value(rng: &mut StdRng, avg_size: usize) -> Vec<u8> {
    // Vary the size by +/-20%
    let size_variation = (avg_size as f64 * 0.2) as usize;
    let size = avg_size.saturating_sub(size_variation) + rng.gen_range(0..size_variation * 2 + 1);

    (0..size).map(|_| rng.sample(Alphanumeric)).collect()
}

fn main() {
    let config = BenchmarkConfig::default();
    let results = run_benchmark(&config);

    println!("Benchmark Summary:");
    println!("{:<8} | {:<18} | {:<18} | {:<18} | {:<8} | {:<10} | {:<12}",
        "Cache", "Insert (ops/s)", "Read (ops/s)", "Write (ops/s)", "Hit rate", "Evictions", "Final size");
    println!("{:-<8}-+-{:-<18}-+-{:-<18}-+-{:-<18}-+-{:-<8}-+-{:-<10}-+-{:-<12}",
        "", "", "", "", "", "", "");

    for result in &results {
        println!("{:<8} | {:<18.2} | {:<18.2} | {:<18.2} | {:<8.3} | {:<10} | {:<12}",
            result.cache_type.to_string(),
            result.insert_throughput,
            result.read_throughput,
            result.write_throughput,
            result.hit_rate,
            result.evictions,
            result.final_size.to_string());
    }
}
