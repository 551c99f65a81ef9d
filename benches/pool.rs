use criterion::*;

use threadcrew::{BoxedTask, FifoQueue, Prioritized, PriorityQueue, ThreadPool};

type FifoPool = ThreadPool<FifoQueue<BoxedTask>>;
type PriorityPool = ThreadPool<PriorityQueue<Prioritized<BoxedTask>>>;

fn criterion_benchmark(c: &mut Criterion) {
    let threads = num_cpus::get().max(1);

    let tasks = 1000_u32;

    let mut group = c.benchmark_group("pool");
    group.sample_size(10);

    group.bench_function("fifo", |b| {
        b.iter_batched(
            || FifoPool::new(threads).unwrap(),
            |pool| {
                for _ in 0..tasks {
                    pool.enqueue(Box::new(|| {
                        let _ = black_box(8 + 9);
                    }));
                }

                pool.join();
            },
            BatchSize::LargeInput,
        );
    });

    // One broadcast for the whole batch instead of a signal per task.
    group.bench_function("fifo_batch", |b| {
        b.iter_batched(
            || FifoPool::new(threads).unwrap(),
            |pool| {
                pool.enqueue_all((0..tasks).map(|_| -> BoxedTask {
                    Box::new(|| {
                        let _ = black_box(8 + 9);
                    })
                }));

                pool.join();
            },
            BatchSize::LargeInput,
        );
    });

    // Heap-ordered selection across a handful of priority classes.
    group.bench_function("priority", |b| {
        b.iter_batched(
            || PriorityPool::new(threads).unwrap(),
            |pool| {
                for n in 0..tasks {
                    pool.enqueue(Prioritized::new(
                        n % 6,
                        Box::new(|| {
                            let _ = black_box(8 + 9);
                        }),
                    ));
                }

                pool.join();
            },
            BatchSize::LargeInput,
        );
    });

    // A backlog accumulated while paused, released in a single burst; the
    // measured section is the resume broadcast plus the drain.
    group.bench_function("paused_burst", |b| {
        b.iter_batched(
            || {
                let pool = FifoPool::new(threads).unwrap();
                pool.pause();

                for _ in 0..tasks {
                    pool.enqueue(Box::new(|| {
                        let _ = black_box(8 + 9);
                    }));
                }

                pool
            },
            |pool| {
                pool.resume().unwrap();
                pool.join();
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
