//! Benchmarks for the hot paths: counting sends and collecting clocks.

use std::thread;

use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;

use quiesce::Quiescence;
use quiesce::Rank;
use quiesce::comm::local::LocalGroup;

fn bench_record_send(c: &mut Criterion) {
    let comm = LocalGroup::new(1).pop().expect("one endpoint");
    let mut q = Quiescence::new(comm);
    q.initialize(&[Rank(0)]).expect("initialize");

    c.bench_function("record_send", |b| {
        b.iter(|| q.record_send(black_box(Rank(0))).expect("successor"));
    });
    c.bench_function("has_in_flight", |b| {
        b.iter(|| q.has_in_flight(black_box(Rank(0))).expect("predecessor"));
    });

    q.finalize().expect("finalize");
}

/// Rank 0 reads from every rank of a group of `size`; the others only
/// publish, and wait in `finalize` until rank 0 is done.
fn bench_collect(c: &mut Criterion) {
    let mut group = c.benchmark_group("collect");

    for size in [1usize, 4, 16] {
        let mut endpoints = LocalGroup::new(size);
        let first = endpoints.remove(0);

        thread::scope(|scope| {
            for comm in endpoints {
                scope.spawn(move || {
                    let mut q = Quiescence::new(comm);
                    q.initialize(&[]).expect("initialize");
                    q.record_send(Rank(0)).expect("successor");
                    q.finalize().expect("finalize");
                });
            }

            let everyone: Vec<Rank> = (0..size as u32).map(Rank).collect();
            let mut q = Quiescence::new(first);
            q.initialize(&everyone).expect("initialize");
            group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
                b.iter(|| q.collect().expect("collect"));
            });
            q.finalize().expect("finalize");
        });
    }

    group.finish();
}

criterion_group!(benches, bench_record_send, bench_collect);
criterion_main!(benches);
