//! Codec benchmarks for huddle-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use huddle_protocol::{codec, Event};

fn bench_encode_small(c: &mut Criterion) {
    let event = Event::chat_message("alice", "x".repeat(64));

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(64));
    group.bench_function("chat_64B", |b| b.iter(|| codec::encode(black_box(&event))));
    group.finish();
}

fn bench_decode_inbound(c: &mut Criterion) {
    let text = format!(r#"{{"message":"{}"}}"#, "x".repeat(64));

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("inbound_64B", |b| {
        b.iter(|| codec::decode_inbound(black_box(&text)))
    });
    group.finish();
}

fn bench_user_list(c: &mut Criterion) {
    let users = (0..500).map(|i| format!("user-{}", i)).collect();
    let event = Event::user_list(users);

    c.bench_function("encode_user_list_500", |b| {
        b.iter(|| codec::encode(black_box(&event)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_encode_small,
    bench_decode_inbound,
    bench_user_list
);
criterion_main!(benches);
