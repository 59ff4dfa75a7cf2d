use criterion::{criterion_group, criterion_main, Criterion};

pub fn spsc_enqueue_dequeue(ctx: &mut Criterion) {
    let mut group = ctx.benchmark_group("spsc-enqueue-dequeue");

    for capacity in [8_usize, 64, 512] {
        group.bench_function(format!("capacity-{}", capacity), |b| {
            let (mut rx, mut tx) = weft::queues::spsc::bounded_queue(capacity);
            b.iter(|| {
                let _ = tx.try_enqueue(13_u64);
                let _ = rx.try_dequeue();
            });
        });
    }

    group.finish();
}

pub fn mpsc_enqueue_dequeue(ctx: &mut Criterion) {
    let mut group = ctx.benchmark_group("mpsc-enqueue-dequeue");

    for capacity in [8_usize, 64, 512] {
        group.bench_function(format!("capacity-{}", capacity), |b| {
            let queue = weft::queues::mpsc::Queue::new(capacity);
            b.iter(|| {
                let _ = queue.try_enqueue(13_u64);
                let _ = queue.try_dequeue();
            });
        });
    }

    group.finish();
}

pub fn mpsc_bulk(ctx: &mut Criterion) {
    let mut group = ctx.benchmark_group("mpsc-bulk");

    let values: Vec<u64> = (0..32).collect();

    group.bench_function("bulk-32", |b| {
        let queue = weft::queues::mpsc::Queue::new(64);
        b.iter(|| {
            let _ = queue.enqueue_bulk(&values);
            let _ = queue.dequeue_bulk(32);
        });
    });

    group.finish();
}

pub fn mpmc_enqueue_dequeue(ctx: &mut Criterion) {
    let mut group = ctx.benchmark_group("mpmc-enqueue-dequeue");

    for capacity in [8_usize, 64, 512] {
        group.bench_function(format!("capacity-{}", capacity), |b| {
            let queue = weft::queues::mpmc::Queue::new(capacity);
            b.iter(|| {
                let _ = queue.try_enqueue(13_u64);
                let _ = queue.try_dequeue();
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    spsc_enqueue_dequeue,
    mpsc_enqueue_dequeue,
    mpsc_bulk,
    mpmc_enqueue_dequeue
);
criterion_main!(benches);
