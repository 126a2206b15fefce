//! Benchmark suite for cache operations

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use graph_cache::{extract, merge, read, restore, CacheContext, GraphSnapshot, JsonValue, RawOperation};
use serde_json::json;

const FEED_QUERY: &str = "{ feed { id title author { id name } comments { id body } } }";

fn feed_payload(size: usize, revision: usize) -> JsonValue {
    let items: Vec<serde_json::Value> = (0..size)
        .map(|i| {
            json!({
                "id": format!("post_{}", i),
                "title": format!("Post {} r{}", i, revision),
                "author": {"id": format!("user_{}", i % 50), "name": format!("User {}", i % 50)},
                "comments": [
                    {"id": format!("comment_{}_0", i), "body": "first"},
                    {"id": format!("comment_{}_1", i), "body": "second"}
                ]
            })
        })
        .collect();
    JsonValue::from(json!({ "feed": items }))
}

fn seeded(context: &CacheContext, size: usize) -> GraphSnapshot {
    let query = context.parse_operation(&RawOperation::query(FEED_QUERY)).unwrap();
    merge(context, &GraphSnapshot::new(), &query, &feed_payload(size, 0))
        .unwrap()
        .snapshot
}

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");
    let context = CacheContext::default();
    let query = context.parse_operation(&RawOperation::query(FEED_QUERY)).unwrap();

    for size in [10, 100, 1000] {
        let payload = feed_payload(size, 0);
        group.bench_with_input(BenchmarkId::new("initial", size), &size, |b, _| {
            b.iter(|| {
                merge(&context, &GraphSnapshot::new(), &query, black_box(&payload)).unwrap();
            });
        });

        let parent = seeded(&context, size);
        let update = feed_payload(size, 1);
        group.bench_with_input(BenchmarkId::new("update", size), &size, |b, _| {
            b.iter(|| {
                merge(&context, &parent, &query, black_box(&update)).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");
    let context = CacheContext::default();
    let query = context.parse_operation(&RawOperation::query(FEED_QUERY)).unwrap();

    for size in [10, 100, 1000] {
        let serialized = extract(&seeded(&context, size));
        // Fresh snapshot per batch so the read memo starts empty
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter_batched(
                || restore(serialized.clone()).unwrap(),
                |snapshot| read(&query, black_box(&snapshot), true),
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

fn bench_orphan_collection(c: &mut Criterion) {
    let mut group = c.benchmark_group("orphan_collection");
    let context = CacheContext::default();
    let query = context.parse_operation(&RawOperation::query(FEED_QUERY)).unwrap();
    let empty_feed = JsonValue::from(json!({ "feed": [] }));

    for size in [10, 100, 1000] {
        let parent = seeded(&context, size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let edit = merge(&context, &parent, &query, black_box(&empty_feed)).unwrap();
                assert!(edit.snapshot.len() < parent.len());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write, bench_read, bench_orphan_collection);
criterion_main!(benches);
