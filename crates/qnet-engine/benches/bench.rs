//! Throughput benchmark for `Q1` enqueue/dequeue under concurrent stage-1
//! pull, mirroring the teacher's `benches/bench.rs` harness setup
//! (`criterion` + a multi-thread Tokio runtime built in the bench itself).

use core::hint::black_box;
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use qnet_core::{Kind, Request};
use qnet_engine::queue1::Queue1;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Builder;

fn make_request(id: u64) -> Request {
    Request {
        id,
        kind: Kind::Z1,
        origin: 1,
        created_at: Instant::now(),
        attempt: 0,
    }
}

fn queue1_bench(c: &mut Criterion) {
    let rt = Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("failed to build Tokio runtime");

    let mut group = c.benchmark_group("queue1_enqueue_dequeue");
    for &n in &[1_000u64, 10_000, 100_000] {
        group.throughput(Throughput::Elements(n));
        group.bench_function(format!("n={n}"), |b| {
            b.to_async(&rt).iter(|| async move {
                let queue = Arc::new(Queue1::new());
                let producer = {
                    let queue = queue.clone();
                    tokio::spawn(async move {
                        for i in 0..n {
                            queue.enqueue(make_request(i)).await.unwrap();
                        }
                    })
                };
                for _ in 0..n {
                    black_box(queue.dequeue_for(Kind::Z1).await);
                }
                producer.await.unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, queue1_bench);
criterion_main!(benches);
