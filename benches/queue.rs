use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use netlist_core::queue::{HeapQueue, LinearQueue, TimedQueue};
use netlist_core::NetlistTime;

/// Schedule pattern of a busy logic netlist: mostly short gate delays
/// relative to the last popped time.
fn churn<Q: TimedQueue<u32>>(q: &mut Q, rounds: usize) {
    for i in 0..32u32 {
        q.emplace::<false>(NetlistTime::from_nsec(i64::from(i % 7) * 5), Some(i));
    }
    for i in 0..rounds {
        let e = q.pop();
        let delay = 10 + (i % 13) as i64;
        q.emplace::<false>(e.exec_time() + NetlistTime::from_nsec(delay), e.object());
    }
    black_box(q.size());
    q.clear();
}

fn bench_queues(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue churn");
    for rounds in [1_000usize, 10_000] {
        group.bench_with_input(BenchmarkId::new("linear", rounds), &rounds, |b, &n| {
            let mut q = LinearQueue::<u32>::new(512);
            b.iter(|| churn(&mut q, n));
        });
        group.bench_with_input(BenchmarkId::new("heap", rounds), &rounds, |b, &n| {
            let mut q = HeapQueue::<u32>::new(512);
            b.iter(|| churn(&mut q, n));
        });
    }
    group.finish();
}

fn bench_remove(c: &mut Criterion) {
    c.bench_function("linear remove", |b| {
        let mut q = LinearQueue::<u32>::new(512);
        b.iter(|| {
            for i in 0..256u32 {
                q.emplace::<false>(NetlistTime::from_nsec(i64::from(i)), Some(i));
            }
            for i in (0..256u32).step_by(2) {
                q.remove::<false>(Some(i));
            }
            q.clear();
        });
    });
}

criterion_group!(benches, bench_queues, bench_remove);
criterion_main!(benches);
