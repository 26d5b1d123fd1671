//! Throughput Benchmark for snapkv
//!
//! This benchmark measures the storage engine and the request decoder
//! under various workloads.

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use snapkv::protocol::{CommandDecoder, RespValue};
use snapkv::storage::{SnapshotConsistency, StorageEngine};
use std::sync::Arc;
use std::time::Duration;

/// Benchmark SET operations
fn bench_insert(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    let mut group = c.benchmark_group("insert");
    group.throughput(Throughput::Elements(1));

    group.bench_function("insert_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            engine.insert(key, Bytes::from("small_value"), None);
            i += 1;
        });
    });

    group.bench_function("insert_medium", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(1024)); // 1KB value
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            engine.insert(key, value.clone(), None);
            i += 1;
        });
    });

    group.bench_function("insert_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("ttl:{}", i));
            engine.insert(key, Bytes::from("value"), Some(Duration::from_secs(3600)));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations
fn bench_get(c: &mut Criterion) {
    let engine = Arc::new(StorageEngine::new());

    for i in 0..100_000 {
        let key = Bytes::from(format!("key:{}", i));
        let value = Bytes::from(format!("value:{}", i));
        engine.insert(key, value, None);
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(engine.get(key.as_bytes()));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(engine.get(key.as_bytes()));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark concurrent access
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let engine = Arc::new(StorageEngine::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let engine = Arc::clone(&engine);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = Bytes::from(format!("key:{}:{}", t, i));
                            engine.insert(key.clone(), Bytes::from("value"), None);
                            engine.get(&key);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(engine.len());
        });
    });

    group.finish();
}

/// Benchmark snapshot copy-out under both consistency modes
fn bench_snapshot(c: &mut Criterion) {
    let engine = StorageEngine::new();
    for i in 0..10_000 {
        engine.insert(
            Bytes::from(format!("key:{}", i)),
            Bytes::from(format!("value:{}", i)),
            None,
        );
    }

    let mut group = c.benchmark_group("snapshot");
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("per_shard", |b| {
        b.iter(|| black_box(engine.snapshot(SnapshotConsistency::PerShard)));
    });

    group.bench_function("global", |b| {
        b.iter(|| black_box(engine.snapshot(SnapshotConsistency::Global)));
    });

    group.finish();
}

/// Benchmark request decoding
fn bench_decode(c: &mut Criterion) {
    let set = RespValue::command(["SET", "key:12345", "some-value", "PX", "5000"]).serialize();

    let mut pipelined = Vec::new();
    for _ in 0..100 {
        pipelined.extend_from_slice(&set);
    }

    let mut group = c.benchmark_group("decode");

    group.throughput(Throughput::Elements(1));
    group.bench_function("single_set", |b| {
        let mut decoder = CommandDecoder::new();
        b.iter(|| {
            let mut buf = BytesMut::from(&set[..]);
            black_box(decoder.decode(&mut buf));
        });
    });

    group.throughput(Throughput::Elements(100));
    group.bench_function("pipelined_100", |b| {
        let mut decoder = CommandDecoder::new();
        b.iter(|| {
            let mut buf = BytesMut::from(&pipelined[..]);
            while let Some(args) = decoder.decode(&mut buf) {
                black_box(args);
            }
        });
    });

    group.throughput(Throughput::Elements(1));
    group.bench_function("inline_ping", |b| {
        let mut decoder = CommandDecoder::new();
        b.iter(|| {
            let mut buf = BytesMut::from(&b"PING\r\n"[..]);
            black_box(decoder.decode(&mut buf));
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_insert,
    bench_get,
    bench_concurrent,
    bench_snapshot,
    bench_decode,
);

criterion_main!(benches);
