//! Benchmarks for the per-packet dispatch path and the epoch control loop.

use ahab_benches::{mixed_workload, testbed_trunk};
use ahab_core::FlowKey;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_process(c: &mut Criterion) {
    let workload = mixed_workload(10_000);
    let mut group = c.benchmark_group("process");
    group.throughput(Throughput::Elements(workload.len() as u64));
    group.bench_function("mixed_10k", |b| {
        b.iter_batched(
            testbed_trunk,
            |mut trunk| {
                let mut dropped = 0u64;
                for packet in &workload {
                    dropped += trunk.process(
                        packet.timestamp_ns,
                        packet.size,
                        packet.slice_id,
                        FlowKey::new(packet.flow),
                    );
                }
                black_box(dropped)
            },
            criterion::BatchSize::LargeInput,
        );
    });
    group.finish();
}

fn bench_end_epoch(c: &mut Criterion) {
    let workload = mixed_workload(10_000);
    c.bench_function("end_epoch/loaded", |b| {
        b.iter_batched(
            || {
                let mut trunk = testbed_trunk();
                for packet in &workload {
                    trunk.process(
                        packet.timestamp_ns,
                        packet.size,
                        packet.slice_id,
                        FlowKey::new(packet.flow),
                    );
                }
                trunk
            },
            |mut trunk| {
                trunk.end_epoch();
                black_box(trunk.snapshot().scaled_capacity)
            },
            criterion::BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_process, bench_end_epoch);
criterion_main!(benches);
