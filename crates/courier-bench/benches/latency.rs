//! Latency benchmarks for Courier.
//!
//! These benchmarks follow one message from the bridge wire to the
//! consumer's `Send` command.

use bytes::BytesMut;
use courier_bench::{arrival, broker_with_consumers, consumer, producer};
use courier_protocol::{codec, Event, Frame};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Instant;

/// Benchmark encode/decode of an arrival event.
fn bench_codec_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_roundtrip");

    let frame = Frame::event(arrival(producer(), 1, 256));

    group.bench_function("256B", |b| {
        b.iter(|| {
            let encoded = codec::encode(black_box(&frame)).unwrap();
            codec::decode(black_box(&encoded)).unwrap()
        });
    });

    // Named-field MessagePack without the length prefix, for comparison.
    group.bench_function("256B_unframed", |b| {
        b.iter(|| {
            let encoded = rmp_serde::to_vec_named(black_box(&frame)).unwrap();
            rmp_serde::from_slice::<Frame>(black_box(&encoded)).unwrap()
        });
    });

    group.finish();
}

/// Benchmark wire bytes in, command bytes out, as the server does it.
fn bench_bridge_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("bridge_path");

    group.bench_function("arrival_to_send", |b| {
        b.iter_custom(|iters| {
            let mut broker = broker_with_consumers("bench", 1, u32::MAX);
            let mut buffer = BytesMut::new();

            let start = Instant::now();
            for tag in 0..iters {
                let wire = codec::encode(&Frame::event(arrival(producer(), tag, 64))).unwrap();
                buffer.extend_from_slice(&wire);
                if let Ok(Some(Frame::Event { event })) = codec::decode_from(&mut buffer) {
                    for command in broker.handle(event) {
                        black_box(codec::encode(&Frame::command(command)).unwrap());
                    }
                }
            }
            start.elapsed()
        });
    });

    group.finish();
}

/// Benchmark publish followed by a credit grant.
fn bench_publish_then_credit(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish_then_credit");

    group.bench_function("single_consumer", |b| {
        b.iter_custom(|iters| {
            let mut broker = broker_with_consumers("bench", 1, 0);

            let start = Instant::now();
            for tag in 0..iters {
                broker.handle(arrival(producer(), tag, 64));
                black_box(broker.handle(Event::LinkSendable {
                    link: consumer(0),
                    credit: 1,
                }));
            }
            start.elapsed()
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_codec_roundtrip,
    bench_bridge_path,
    bench_publish_then_credit,
);
criterion_main!(benches);
