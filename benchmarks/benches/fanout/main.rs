// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Criterion benchmarks for acked fan-out delivery against tokio::sync::broadcast.

#![allow(missing_docs)]

use std::hint::black_box;

use bytes::Bytes;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use membus_engine::{Message, PubSub, PubSubConfig, SendTimeout, Subscription};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

const MSG_COUNT: u64 = 2_000;
const MSG_SIZES: [usize; 2] = [32, 4096];
const SUBSCRIBER_COUNTS: [usize; 3] = [1, 2, 4];
const OUTPUT_BUFFERS: [usize; 2] = [0, 64];

#[derive(Clone, Copy)]
struct BenchCase {
    msg_size: usize,
    num_subs: usize,
    output_buffer: usize,
}

fn make_payload(size: usize) -> Bytes {
    Bytes::from(vec![42u8; size])
}

fn spawn_counting_consumer(mut sub: Subscription) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut count = 0u64;
        while let Some(msg) = sub.recv().await {
            _ = black_box(msg.payload());
            _ = msg.ack();
            count += 1;
        }
        count
    })
}

async fn wait_for_subscribers(pubsub: &PubSub, topic: &str, count: usize) {
    while pubsub.subscriber_count(topic).await < count {
        tokio::task::yield_now().await;
    }
}

async fn run_pubsub_case(case: BenchCase, persistent: bool) {
    let config = PubSubConfig::new(case.output_buffer, SendTimeout::Disabled);
    let pubsub = if persistent {
        PubSub::persistent(config)
    } else {
        PubSub::new(config)
    }
    .expect("bench config should be valid");

    let mut sub_handles = Vec::new();
    for _ in 0..case.num_subs {
        let sub = pubsub
            .subscribe("bench-fanout")
            .await
            .expect("subscribe should succeed");
        sub_handles.push(spawn_counting_consumer(sub));
    }
    wait_for_subscribers(&pubsub, "bench-fanout", case.num_subs).await;

    let payload = make_payload(case.msg_size);
    for i in 0..MSG_COUNT {
        pubsub
            .publish_one("bench-fanout", Message::new(i.to_string(), payload.clone()))
            .await
            .expect("publish should succeed");
    }
    pubsub.close().await.expect("close should succeed");

    let mut total = 0u64;
    for h in sub_handles {
        total += h.await.expect("consumer should finish");
    }
    assert_eq!(total, MSG_COUNT * case.num_subs as u64);
}

async fn run_tokio_broadcast_case(case: BenchCase) {
    let (tx, _rx) = tokio::sync::broadcast::channel::<Bytes>(MSG_COUNT as usize);

    let mut sub_handles = Vec::new();
    for _ in 0..case.num_subs {
        let mut rx = tx.subscribe();
        sub_handles.push(tokio::spawn(async move {
            let mut count = 0u64;
            while let Ok(msg) = rx.recv().await {
                _ = black_box(&msg);
                count += 1;
            }
            count
        }));
    }

    let payload = make_payload(case.msg_size);
    for _ in 0..MSG_COUNT {
        _ = tx.send(payload.clone());
    }
    drop(tx);

    let mut total = 0u64;
    for h in sub_handles {
        total += h.await.expect("receiver should finish");
    }
    assert_eq!(total, MSG_COUNT * case.num_subs as u64);
}

/// Time for a late subscriber to replay a retained topic.
async fn run_replay_case(msg_size: usize) {
    let pubsub = PubSub::persistent(PubSubConfig::new(64, SendTimeout::Disabled))
        .expect("bench config should be valid");
    let payload = make_payload(msg_size);
    let batch = (0..MSG_COUNT)
        .map(|i| Message::new(i.to_string(), payload.clone()))
        .collect();
    pubsub
        .publish("bench-replay", batch)
        .await
        .expect("publish should succeed");

    let sub = pubsub
        .subscribe("bench-replay")
        .await
        .expect("subscribe should succeed");
    let consumer = spawn_counting_consumer(sub);
    wait_for_subscribers(&pubsub, "bench-replay", 1).await;
    pubsub.close().await.expect("close should succeed");
    assert_eq!(consumer.await.expect("consumer should finish"), MSG_COUNT);
}

/// Acked fan-out (one ack round-trip per copy) against fire-and-forget broadcast.
fn bench_fanout_vs_tokio(c: &mut Criterion) {
    for &msg_size in &MSG_SIZES {
        let mut group = c.benchmark_group(format!("fanout_vs_tokio/{}B", msg_size));
        _ = group.throughput(Throughput::Elements(MSG_COUNT));

        for &num_subs in &SUBSCRIBER_COUNTS {
            for &output_buffer in &OUTPUT_BUFFERS {
                let case = BenchCase {
                    msg_size,
                    num_subs,
                    output_buffer,
                };
                _ = group.bench_with_input(
                    BenchmarkId::new(format!("pubsub/buffer={output_buffer}"), num_subs),
                    &case,
                    |b, case| {
                        let rt = Runtime::new().expect("runtime");
                        b.to_async(&rt).iter(|| run_pubsub_case(*case, false));
                    },
                );
            }

            let case = BenchCase {
                msg_size,
                num_subs,
                output_buffer: 0,
            };
            _ = group.bench_with_input(BenchmarkId::new("tokio", num_subs), &case, |b, case| {
                let rt = Runtime::new().expect("runtime");
                b.to_async(&rt).iter(|| run_tokio_broadcast_case(*case));
            });
        }

        group.finish();
    }
}

/// Cost of retention on the publish path.
fn bench_persistent_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("persistent_fanout");
    _ = group.throughput(Throughput::Elements(MSG_COUNT));

    for &num_subs in &SUBSCRIBER_COUNTS {
        let case = BenchCase {
            msg_size: 256,
            num_subs,
            output_buffer: 64,
        };
        _ = group.bench_with_input(BenchmarkId::new("volatile", num_subs), &case, |b, case| {
            let rt = Runtime::new().expect("runtime");
            b.to_async(&rt).iter(|| run_pubsub_case(*case, false));
        });
        _ = group.bench_with_input(BenchmarkId::new("persistent", num_subs), &case, |b, case| {
            let rt = Runtime::new().expect("runtime");
            b.to_async(&rt).iter(|| run_pubsub_case(*case, true));
        });
    }

    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");
    _ = group.throughput(Throughput::Elements(MSG_COUNT));

    for &msg_size in &MSG_SIZES {
        _ = group.bench_with_input(
            BenchmarkId::from_parameter(msg_size),
            &msg_size,
            |b, msg_size| {
                let rt = Runtime::new().expect("runtime");
                b.to_async(&rt).iter(|| run_replay_case(*msg_size));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_fanout_vs_tokio,
    bench_persistent_fanout,
    bench_replay
);
criterion_main!(benches);
