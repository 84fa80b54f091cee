use std::hint::black_box;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use handoff::BlockingQueue;

const ITEMS: u64 = 1024;
const CONSUMERS: &[usize] = &[1, 2, 4, 8];

fn uncontended(c: &mut Criterion) {
    let queue = BlockingQueue::new();
    c.bench_function("push_pop", |b| {
        b.iter(|| {
            queue.push(black_box(1u64));
            black_box(queue.try_pop())
        })
    });
}

fn contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("handoff");
    for &consumers in CONSUMERS {
        group.bench_function(format!("consumers={consumers}"), |b| {
            b.iter(|| {
                let queue = &BlockingQueue::new();
                std::thread::scope(|cx| {
                    for _ in 0..consumers {
                        // Consumers leave once the producer has gone quiet.
                        cx.spawn(move || {
                            while let Some(i) = queue.pop(Duration::from_millis(5)) {
                                black_box(i);
                            }
                        });
                    }
                    for i in 0..ITEMS {
                        queue.push(i);
                    }
                });
            })
        });
    }
    group.finish();
}

criterion_group!(benches, uncontended, contended);
criterion_main!(benches);
