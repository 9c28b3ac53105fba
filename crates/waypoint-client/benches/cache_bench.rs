// Criterion benchmarks for the address cache and request rewriting
//
// Run benchmarks with:
//   cargo bench -p waypoint-client

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hyper::body::Bytes;
use hyper::Request;
use std::time::Duration;
use waypoint_client::cache::AddressCache;
use waypoint_client::dispatcher::rewrite;
use waypoint_common::HostPort;

fn bench_cache(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();

    let mut group = c.benchmark_group("address_cache");

    for size in [16usize, 1024] {
        let cache = AddressCache::new(Duration::from_secs(60));
        for i in 0..size {
            cache.store(
                HostPort::new(format!("svc-{}", i), 9000),
                HostPort::new(format!("10.0.{}.{}", i / 256, i % 256), 9000),
            );
        }
        let hit = HostPort::new("svc-7", 9000);
        let miss = HostPort::new("unknown-svc", 9000);

        group.bench_with_input(BenchmarkId::new("lookup_hit", size), &cache, |b, cache| {
            b.iter(|| cache.lookup(black_box(&hit)));
        });
        group.bench_with_input(BenchmarkId::new("lookup_miss", size), &cache, |b, cache| {
            b.iter(|| cache.lookup(black_box(&miss)));
        });
        group.bench_with_input(BenchmarkId::new("sweep_nothing_stale", size), &cache, |b, cache| {
            b.iter(|| cache.sweep_stale());
        });
    }

    group.bench_function("store_replace", |b| {
        let cache = AddressCache::new(Duration::from_secs(60));
        let key = HostPort::new("svc-1", 9000);
        b.iter(|| cache.store(key.clone(), HostPort::new("10.0.0.5", 9000)));
    });

    group.finish();
}

fn bench_rewrite(c: &mut Criterion) {
    let request = Request::post("http://orders-service:8080/orders/7?expand=items")
        .header("content-type", "application/json")
        .header("x-trace", "4bf92f3577b34da6")
        .body(Bytes::from_static(br#"{"qty":3}"#))
        .unwrap();
    let (parts, body) = request.into_parts();
    let resolved = HostPort::new("10.0.0.5", 8080);

    c.bench_function("rewrite_request", |b| {
        b.iter(|| rewrite(black_box(&parts), &body, &resolved));
    });
}

criterion_group!(benches, bench_cache, bench_rewrite);
criterion_main!(benches);
