//! Benchmarks for the ID allocator and connection tracker (C2/C3).
//!
//! Run with: cargo bench

use std::net::SocketAddr;

use criterion::{black_box, BenchmarkId, Criterion, Throughput};

use dot_relay::tracker::Tracker;

fn client_addr() -> SocketAddr {
    SocketAddr::from(([192, 168, 2, 10], 51515))
}

fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker");
    group.throughput(Throughput::Elements(1));

    group.bench_function(BenchmarkId::new("allocate_bind_take", "uncontended"), |b| {
        let tracker = Tracker::new();
        b.iter(|| {
            let id = tracker.allocate().unwrap();
            tracker.bind(id, black_box(0x1234), black_box(client_addr()));
            black_box(tracker.take(id))
        })
    });

    group.bench_function(BenchmarkId::new("allocate", "under_load"), |b| {
        let tracker = Tracker::new();
        // Pre-load the tracker so allocate has to probe past existing entries.
        for _ in 0..1000 {
            let id = tracker.allocate().unwrap();
            tracker.bind(id, 0, client_addr());
        }
        b.iter(|| {
            let id = tracker.allocate().unwrap();
            tracker.take(id)
        })
    });

    group.finish();
}

fn main() {
    let mut criterion = Criterion::default().configure_from_args();
    bench_allocate(&mut criterion);
    criterion.final_summary();
}
