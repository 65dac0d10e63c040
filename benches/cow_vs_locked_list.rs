//! Copy-on-write list vs. mutex-guarded list.
//!
//! The copy-on-write list clones its whole backing vector on every write,
//! which makes reads lock-free in spirit (readers clone an `Arc`) and writes
//! O(n). Only the sizes are checked: both lists must end up equally long.

use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use parking_lot::{Mutex, RwLock};
use rand::Rng;

const NUM_THREADS: usize = 8;
const WRITES: usize = 10_000;
const READS: usize = 200_000;
const PREFILL: usize = 100_000;

#[derive(Default)]
struct CopyOnWriteList {
    items: RwLock<Arc<Vec<u32>>>,
}

impl CopyOnWriteList {
    fn prefilled(n: usize) -> Self {
        Self {
            items: RwLock::new(Arc::new((0..n as u32).collect())),
        }
    }

    fn push(&self, value: u32) {
        let mut items = self.items.write();
        let mut next = Vec::with_capacity(items.len() + 1);
        next.extend_from_slice(&items);
        next.push(value);
        *items = Arc::new(next);
    }

    fn get(&self, index: usize) -> Option<u32> {
        let items = Arc::clone(&*self.items.read());
        items.get(index).copied()
    }

    fn len(&self) -> usize {
        self.items.read().len()
    }
}

#[derive(Default)]
struct LockedList {
    items: Mutex<Vec<u32>>,
}

impl LockedList {
    fn prefilled(n: usize) -> Self {
        Self {
            items: Mutex::new((0..n as u32).collect()),
        }
    }

    fn push(&self, value: u32) {
        self.items.lock().push(value);
    }

    fn get(&self, index: usize) -> Option<u32> {
        self.items.lock().get(index).copied()
    }

    fn len(&self) -> usize {
        self.items.lock().len()
    }
}

fn spread<F>(total: usize, op: F)
where
    F: Fn(usize) + Send + Sync + 'static,
{
    let op = Arc::new(op);
    let per_thread = total / NUM_THREADS;
    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let op = Arc::clone(&op);
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..per_thread {
                    op(rng.gen_range(0..total));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

fn bench_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_write");
    group.sample_size(10);
    let label = format!("{}threads x {}writes", NUM_THREADS, WRITES);

    group.bench_function(BenchmarkId::new("CopyOnWriteList", &label), |b| {
        b.iter(|| {
            let list = Arc::new(CopyOnWriteList::default());
            let l = Arc::clone(&list);
            spread(WRITES, move |v| l.push(v as u32));
            black_box(list.len())
        })
    });

    group.bench_function(BenchmarkId::new("LockedList", &label), |b| {
        b.iter(|| {
            let list = Arc::new(LockedList::default());
            let l = Arc::clone(&list);
            spread(WRITES, move |v| l.push(v as u32));
            black_box(list.len())
        })
    });

    group.finish();

    let cow = Arc::new(CopyOnWriteList::default());
    let locked = Arc::new(LockedList::default());
    let (c1, l1) = (Arc::clone(&cow), Arc::clone(&locked));
    spread(WRITES, move |v| c1.push(v as u32));
    spread(WRITES, move |v| l1.push(v as u32));
    assert_eq!(cow.len(), locked.len());
}

fn bench_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_read");
    let label = format!("{}threads x {}reads", NUM_THREADS, READS);

    let cow = Arc::new(CopyOnWriteList::prefilled(PREFILL));
    let locked = Arc::new(LockedList::prefilled(PREFILL));
    assert_eq!(cow.len(), locked.len());

    group.bench_function(BenchmarkId::new("CopyOnWriteList", &label), |b| {
        b.iter(|| {
            let l = Arc::clone(&cow);
            spread(READS, move |i| {
                black_box(l.get(i % PREFILL));
            });
        })
    });

    group.bench_function(BenchmarkId::new("LockedList", &label), |b| {
        b.iter(|| {
            let l = Arc::clone(&locked);
            spread(READS, move |i| {
                black_box(l.get(i % PREFILL));
            });
        })
    });

    group.finish();
}

criterion_group!(benches, bench_writes, bench_reads);
criterion_main!(benches);
