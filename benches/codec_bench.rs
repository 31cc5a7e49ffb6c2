//! Benchmarks for the wire codec (C1).
//!
//! Run with: cargo bench

use criterion::{black_box, BenchmarkId, Criterion, Throughput};

use dot_relay::codec;

fn build_query(id: u16, domain: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(512);
    buf.extend_from_slice(&id.to_be_bytes());
    buf.extend_from_slice(&[0x01, 0x00]);
    buf.extend_from_slice(&[0x00, 0x01]);
    buf.extend_from_slice(&[0x00, 0x00]);
    buf.extend_from_slice(&[0x00, 0x00]);
    buf.extend_from_slice(&[0x00, 0x00]);
    for label in domain.split('.') {
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);
    buf.extend_from_slice(&[0x00, 0x01]); // QTYPE A
    buf.extend_from_slice(&[0x00, 0x01]); // QCLASS IN
    buf
}

fn build_response(id: u16, domain: &str, ttl: u32) -> Vec<u8> {
    let mut buf = build_query(id, domain);
    buf[6..8].copy_from_slice(&1u16.to_be_bytes()); // ANCOUNT = 1
    buf.extend_from_slice(&[0xC0, 0x0C]);
    buf.extend_from_slice(&1u16.to_be_bytes());
    buf.extend_from_slice(&1u16.to_be_bytes());
    buf.extend_from_slice(&ttl.to_be_bytes());
    buf.extend_from_slice(&4u16.to_be_bytes());
    buf.extend_from_slice(&[93, 184, 216, 34]);
    buf
}

fn bench_codec(c: &mut Criterion) {
    let query = build_query(0x1234, "example.com");
    let response = build_response(0x4242, "example.com", 30);
    let frame = codec::udp_to_tls(&query, 0x4242).unwrap();

    let mut group = c.benchmark_group("codec");
    group.throughput(Throughput::Elements(1));

    group.bench_function(BenchmarkId::new("parse_udp", "simple"), |b| {
        b.iter(|| codec::parse_udp(black_box(&query)).unwrap())
    });

    group.bench_function(BenchmarkId::new("udp_to_tls", "simple"), |b| {
        b.iter(|| codec::udp_to_tls(black_box(&query), black_box(0x4242)).unwrap())
    });

    group.bench_function(BenchmarkId::new("parse_tls", "simple"), |b| {
        b.iter(|| codec::parse_tls(black_box(&frame)).unwrap())
    });

    group.bench_function(BenchmarkId::new("rewrite", "single_answer"), |b| {
        b.iter(|| codec::rewrite(black_box(&response), black_box(0x1234)).unwrap())
    });

    group.finish();
}

fn main() {
    let mut criterion = Criterion::default().configure_from_args();
    bench_codec(&mut criterion);
    criterion.final_summary();
}
