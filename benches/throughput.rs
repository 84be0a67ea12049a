//! Throughput benchmarks for the register's hot paths.
//!
//! Run with:
//!     cargo bench --bench throughput

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use objreg::{Managed, PolicySet, Register, ReleasePolicy};

/// Entries the register is pre-filled with.
const LIVE: usize = 10_000;

/// Operations executed per criterion iteration (hot-loop size).
const OPS: u64 = 1_000;

type Payload = Managed<u64>;

fn prefilled() -> (Register, Vec<String>) {
    let register = Register::new();
    let ids = (0..LIVE as u64)
        .map(|i| register.register_object(Managed::new(i), None, [ReleasePolicy::keep_alive_ms(600_000)]))
        .collect();
    (register, ids)
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

fn bench_find_hit(c: &mut Criterion) {
    let (register, ids) = prefilled();
    let mut group = c.benchmark_group("find_hit");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function("find_object", |b| {
        b.iter(|| {
            for id in ids.iter().take(OPS as usize) {
                black_box(register.find_object::<Payload>(black_box(id)));
            }
        })
    });
    group.bench_function("touch_object", |b| {
        b.iter(|| {
            for id in ids.iter().take(OPS as usize) {
                black_box(register.touch_object::<Payload>(black_box(id)));
            }
        })
    });
    group.finish();
}

fn bench_miss(c: &mut Criterion) {
    let (register, ids) = prefilled();
    let mut group = c.benchmark_group("miss");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function("unknown_handle", |b| {
        b.iter(|| {
            for _ in 0..OPS {
                black_box(register.find_object::<Payload>(black_box("not-a-handle")));
            }
        })
    });
    group.bench_function("wrong_type", |b| {
        b.iter(|| {
            for id in ids.iter().take(OPS as usize) {
                black_box(register.find_object::<Managed<i32>>(black_box(id)));
            }
        })
    });
    group.finish();
}

// ---------------------------------------------------------------------------
// Registration lifecycle
// ---------------------------------------------------------------------------

fn bench_register_use_once(c: &mut Criterion) {
    let register = Register::new();
    let mut group = c.benchmark_group("register_use_once");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function("after_use_1", |b| {
        b.iter(|| {
            for i in 0..OPS {
                let id = register.register_object(Managed::new(i), None, [ReleasePolicy::after_use(1)]);
                black_box(register.use_object::<Payload>(&id));
            }
            register.remove_all_objects_with_tag(None);
        })
    });
    group.bench_function("manual_remove", |b| {
        b.iter(|| {
            for i in 0..OPS {
                let id = register.register_object(Managed::new(i), None, PolicySet::Manual);
                black_box(register.remove_object::<Payload>(&id));
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_find_hit, bench_miss, bench_register_use_once);
criterion_main!(benches);
