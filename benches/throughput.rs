//! Throughput Benchmark for icepeak
//!
//! This benchmark measures the performance of the storage
//! under various workloads.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use icepeak::Storage;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

/// Builds a storage on `rt`; its expiry tasks run on the runtime's workers.
fn storage(rt: &Runtime) -> Storage<Bytes> {
    let _guard = rt.enter();
    Storage::with_default_shards(CancellationToken::new()).unwrap()
}

/// Benchmark SET operations
fn bench_set(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let storage = storage(&rt);

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let value = Bytes::from("small_value");
            storage.set(format!("key:{}", i), value, None);
            i += 1;
        });
    });

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(1024)); // 1KB value
        b.iter(|| {
            storage.set(
                format!("ttl:{}", i),
                value.clone(),
                Some(Duration::from_secs(3600)),
            );
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let storage = storage(&rt);

    // Pre-populate with data
    for i in 0..100_000 {
        storage.set(
            format!("key:{}", i),
            Bytes::from(format!("value:{}", i)),
            None,
        );
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(storage.get(&format!("key:{}", i % 100_000)));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(storage.get(&format!("missing:{}", i)));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark mixed workload (80% reads, 20% writes)
fn bench_mixed(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let storage = storage(&rt);

    // Pre-populate
    for i in 0..10_000 {
        storage.set(
            format!("key:{}", i),
            Bytes::from(format!("value:{}", i)),
            None,
        );
    }

    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(1));

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            if i % 5 == 0 {
                // 20% writes
                storage.set(format!("new:{}", i), Bytes::from("value"), None);
            } else {
                // 80% reads
                black_box(storage.get(&format!("key:{}", i % 10_000)));
            }
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark concurrent access
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let storage = Arc::new(storage(&rt));
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let storage = Arc::clone(&storage);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = format!("key:{}:{}", t, i);
                            storage.set(key.as_str(), Bytes::from("value"), None);
                            storage.get(&key);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(storage.len());
        });
    });

    group.finish();
}

/// Benchmark a full sweep over a shard population that is half expired
fn bench_expiry(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("expiry");

    group.bench_function("purge_expired_10k", |b| {
        b.iter_batched(
            || {
                let storage = storage(&rt);
                for i in 0..10_000 {
                    let ttl = (i % 2 == 0).then_some(Duration::ZERO);
                    storage.set(format!("key:{}", i), Bytes::from("value"), ttl);
                }
                storage
            },
            |storage| black_box(storage.purge_expired()),
            criterion::BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_set,
    bench_get,
    bench_mixed,
    bench_concurrent,
    bench_expiry,
);

criterion_main!(benches);
