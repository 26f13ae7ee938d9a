use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use bytesize::ByteSize;
use tempfile::tempdir;
use tiered_cache::{
    BatchProcessor, Cache, CacheConfig, CacheManager, CacheOptions, CacheType, DiskCache, ManualClock,
    MemoryCache, PerformanceMonitor, VectorCacheOptimizer,
};

fn embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; 8];
    for (i, byte) in text.bytes().enumerate() {
        vector[i % 8] += byte as f32;
    }
    vector
}

#[test]
fn test_round_trip_on_both_backends() {
    let dir = tempdir().unwrap();
    let backends: Vec<Box<dyn Cache>> = vec![
        Box::new(MemoryCache::new(100).unwrap()),
        Box::new(DiskCache::open(dir.path(), ByteSize::mib(1)).unwrap()),
    ];

    let cases: [(&str, &[u8]); 3] = [("a", b""), ("b/c", b"\x00\xff"), ("unicode \u{1F600}", b"payload")];

    for cache in &backends {
        for (key, value) in cases {
            assert!(cache.set(key, value, None));
            assert_eq!(cache.get(key).as_deref(), Some(value), "backend {}", cache.name());
        }
        assert!(cache.clear());
        assert!(cache.is_empty());
    }
}

#[test]
fn test_ttl_expiry_through_manager() {
    let dir = tempdir().unwrap();
    let clock = Arc::new(ManualClock::new());
    let config = CacheConfig::new().with_disk_path(dir.path());
    let manager = CacheManager::with_clock(config, clock.clone()).unwrap();

    for cache_type in [CacheType::Memory, CacheType::Disk] {
        let cache = manager.cache(cache_type).unwrap();
        cache.set("session", b"state", Some(Duration::from_secs(10)));
        assert!(cache.contains("session"));
    }

    clock.advance(Duration::from_secs(10));

    for cache_type in [CacheType::Memory, CacheType::Disk] {
        let cache = manager.cache(cache_type).unwrap();
        assert_eq!(cache.get("session"), None);
        assert_eq!(cache.len(), 0);
        assert!(!cache.delete("session"));
    }
}

#[test]
fn test_memoized_result_expires() {
    let clock = Arc::new(ManualClock::new());
    let manager = CacheManager::with_clock(CacheConfig::new(), clock.clone()).unwrap();
    let calls = AtomicUsize::new(0);

    let options = CacheOptions::new(CacheType::Memory).with_ttl(Some(Duration::from_secs(60)));
    let summarize = manager
        .cached("summarize", options, |text: &str| -> Result<usize, ()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.len())
        })
        .unwrap();

    summarize.call("a long counseling transcript").unwrap();
    clock.advance(Duration::from_secs(30));
    summarize.call("a long counseling transcript").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance(Duration::from_secs(30));
    summarize.call("a long counseling transcript").unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_disk_memoization_survives_restart() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::new().with_disk_path(dir.path());
    let calls = AtomicUsize::new(0);

    let run = |config: CacheConfig| {
        let manager = CacheManager::new(config).unwrap();
        let persona_reply = manager
            .cached("persona_reply", CacheOptions::new(CacheType::Disk), |prompt: &String| -> Result<String, ()> {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(format!("I hear you: {}", prompt))
            })
            .unwrap();
        persona_reply.call(&"I can't sleep".to_string()).unwrap()
    };

    let first = run(config.clone());
    let second = run(config);

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failures_never_cached() {
    let manager = CacheManager::new(CacheConfig::new()).unwrap();
    let calls = AtomicUsize::new(0);

    let flaky = manager
        .cached("flaky", manager.options(CacheType::Memory), |n: &u32| -> Result<u32, String> {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Err("timeout".to_string())
            } else {
                Ok(n + 1)
            }
        })
        .unwrap();

    assert_eq!(flaky.call(&1), Err("timeout".to_string()));
    assert_eq!(flaky.call(&1), Ok(2));
    assert_eq!(flaky.call(&1), Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_vector_cache_with_batch_and_monitor() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::new()
        .with_disk_path(dir.path())
        .with_batch_size(4)
        .with_max_workers(3);
    let manager = Arc::new(CacheManager::new(config.clone()).unwrap());
    let optimizer = VectorCacheOptimizer::new(manager.clone()).unwrap();
    let monitor = Arc::new(PerformanceMonitor::new());
    let processor = BatchProcessor::from_config(&config).unwrap();
    let calls = AtomicUsize::new(0);

    let cached_embed = optimizer
        .cached_embedding("test-model", |text: &str| -> Result<Vec<f32>, ()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(embed(text))
        })
        .unwrap();
    let timed_embed = monitor.timed("embed", |text: &String| cached_embed.call(text));

    let texts: Vec<String> = ["hello", "goodbye", "hello", "how are you", "goodbye", "hello"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    // First pass fills the cache in order
    let sequential = processor.process_batch(&texts, |text| timed_embed.call(text).unwrap());
    assert_eq!(sequential[0], embed("hello"));
    assert_eq!(sequential[3], embed("how are you"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Parallel pass is served from the cache, still in input order
    let parallel = processor.map_parallel(&texts, |text| timed_embed.call(text));
    let parallel: Vec<Vec<f32>> = parallel.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(parallel, sequential);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    assert_eq!(monitor.execution_count("embed"), 12);
    let report = monitor.report();
    assert_eq!(report.operations["embed"].count, 12);

    let stats = manager.stats();
    assert_eq!(stats[&CacheType::Memory].entries, 3);
    assert_eq!(stats[&CacheType::Memory].misses, 3);
}

#[test]
fn test_disk_capacity_under_memoization() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::new()
        .with_disk_path(dir.path())
        .with_disk_max_size(ByteSize::kib(4));
    let manager = CacheManager::new(config).unwrap();

    let padded = manager
        .cached("padded", CacheOptions::new(CacheType::Disk), |n: &u32| -> Result<Vec<u8>, ()> {
            Ok(vec![*n as u8; 256])
        })
        .unwrap();

    for n in 0..64 {
        padded.call(&n).unwrap();
    }

    let disk = manager.cache(CacheType::Disk).unwrap();
    let stats = disk.stats();
    assert!(stats.size_bytes <= ByteSize::kib(4).as_u64());
    assert!(stats.evictions > 0);

    // Oldest results were evicted first, newest survive
    assert!(!disk.contains(&padded.cache_key(&0).unwrap()));
    assert!(disk.contains(&padded.cache_key(&63).unwrap()));
}

#[test]
fn test_concurrent_memoization_and_reads() {
    let dir = tempdir().unwrap();
    let config = CacheConfig::new()
        .with_disk_path(dir.path())
        .with_memory_max_entries(32);
    let manager = Arc::new(CacheManager::new(config).unwrap());

    let handles: Vec<_> = (0..6)
        .map(|t| {
            let manager = manager.clone();
            std::thread::spawn(move || {
                let cache_type = if t % 2 == 0 { CacheType::Memory } else { CacheType::Disk };
                let cache = manager.cache(cache_type).unwrap();
                for i in 0..50 {
                    let key = format!("{}-{}", t, i % 10);
                    cache.set(&key, key.as_bytes(), None);
                    if let Some(value) = cache.get(&key) {
                        assert_eq!(value, key.as_bytes());
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert!(manager.cache(CacheType::Memory).unwrap().len() <= 32);
    assert_eq!(manager.cache(CacheType::Disk).unwrap().len(), 30);
}
