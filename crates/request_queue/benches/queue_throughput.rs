//! Benchmark of request dispatch through the adaptive worker.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use request_queue::{FunnelQueue, QueueItem, RequestQueue, RequestQueueConfig};

const REQUESTS: u64 = 10_000;

struct Lookup(u64);

impl QueueItem for Lookup {}

fn dispatch(producers: u64) {
    let sum = Arc::new(AtomicU64::new(0));
    let total = Arc::clone(&sum);
    let queue = RequestQueue::new("bench", RequestQueueConfig::default(), move |r: Lookup| {
        total.fetch_add(black_box(r.0), Ordering::Relaxed);
    })
    .unwrap();

    let per_producer = REQUESTS / producers;
    thread::scope(|scope| {
        for p in 0..producers {
            let queue = &queue;
            scope.spawn(move || {
                for i in 0..per_producer {
                    queue.enqueue(Lookup(p * per_producer + i));
                }
            });
        }
    });
    queue.finish().unwrap();
    black_box(sum.load(Ordering::Relaxed));
}

fn bench_request_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_queue");
    group.throughput(Throughput::Elements(REQUESTS));

    for producers in [1u64, 2, 4, 8] {
        group.bench_with_input(
            BenchmarkId::new("producers", producers),
            &producers,
            |b, &producers| b.iter(|| dispatch(producers)),
        );
    }

    group.finish();
}

fn bench_funnel_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("funnel_queue");
    group.throughput(Throughput::Elements(REQUESTS));

    group.bench_function("put_poll", |b| {
        let queue = FunnelQueue::new();
        b.iter(|| {
            for i in 0..REQUESTS {
                queue.put(i);
            }
            while let Some(entry) = queue.poll() {
                black_box(entry);
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_request_queue, bench_funnel_queue);
criterion_main!(benches);
