//! Throughput benchmarks for Huddle.
//!
//! These benchmarks measure the raw event throughput of the codec, the
//! frame router and room fan-out.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use huddle_core::{mailbox, route, ConnectionId, GroupId, GroupRegistry, Identity, Mailbox, RoomId};
use huddle_protocol::{codec, Event, InboundFrame};

/// Benchmark event encoding.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for size in [64usize, 1024, 16384] {
        let event = Event::chat_message("alice", "x".repeat(size));
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &event, |b, event| {
            b.iter(|| codec::encode(black_box(event)))
        });
    }

    let users: Vec<String> = (0..100).map(|i| format!("user-{}", i)).collect();
    let list = Event::user_list(users);
    group.bench_function("user_list_100", |b| {
        b.iter(|| codec::encode(black_box(&list)))
    });

    group.finish();
}

/// Benchmark inbound frame decoding.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_inbound");

    for size in [64usize, 1024, 16384] {
        let encoded = codec::encode_inbound(&InboundFrame::new("x".repeat(size))).unwrap();
        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| codec::decode_inbound(black_box(encoded)))
        });
    }

    group.finish();
}

/// Benchmark frame routing.
fn bench_route(c: &mut Criterion) {
    let mut group = c.benchmark_group("route");
    let identity = Identity::authenticated("alice");

    let chat = codec::encode_inbound(&InboundFrame::new("hello everyone")).unwrap();
    group.bench_function("chat", |b| {
        b.iter(|| route(black_box(&identity), black_box(&chat)))
    });

    let pm = codec::encode_inbound(&InboundFrame::new("/pm bob hello there")).unwrap();
    group.bench_function("private_message", |b| {
        b.iter(|| route(black_box(&identity), black_box(&pm)))
    });

    group.finish();
}

fn populate(registry: &GroupRegistry, group_id: &GroupId, size: usize) -> Vec<Mailbox> {
    (0..size)
        .map(|i| {
            let (handle, mailbox) = mailbox(ConnectionId::new(format!("conn-{}", i)), 16);
            registry.join(group_id, &handle);
            mailbox
        })
        .collect()
}

/// Benchmark room fan-out; every mailbox is drained so nobody is evicted.
fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");
    let room = GroupId::room(&RoomId::new("general"));

    for size in [10usize, 100, 1000, 10000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let registry = GroupRegistry::new();
            let mut mailboxes = populate(&registry, &room, size);

            b.iter(|| {
                let delivery =
                    registry.broadcast(&room, Event::chat_message("alice", "hello everyone"));
                for mailbox in &mut mailboxes {
                    let _ = mailbox.try_recv();
                }
                black_box(delivery)
            });
        });
    }

    group.finish();
}

/// Benchmark registry membership churn.
fn bench_membership(c: &mut Criterion) {
    let mut group = c.benchmark_group("membership");

    group.bench_function("join_leave", |b| {
        let registry = GroupRegistry::new();
        let room = GroupId::room(&RoomId::new("general"));
        let mut i = 0u64;
        b.iter(|| {
            let (handle, _mailbox) = mailbox(ConnectionId::new(format!("conn-{}", i)), 1);
            i += 1;
            registry.join(&room, &handle);
            registry.leave(&room, handle.id());
        });
    });

    group.bench_function("online_offline", |b| {
        let registry = GroupRegistry::new();
        let room = GroupId::room(&RoomId::new("general"));
        let mut watchers = populate(&registry, &room, 1);
        let conn = ConnectionId::new("conn-presence");
        b.iter(|| {
            registry.mark_online(&room, &conn, "alice");
            registry.mark_offline(&room, &conn, "alice");
            for watcher in &mut watchers {
                while watcher.try_recv().is_some() {}
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_route,
    bench_fanout,
    bench_membership,
);
criterion_main!(benches);
