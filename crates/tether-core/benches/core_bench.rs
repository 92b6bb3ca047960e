//! Criterion benchmarks for tether-core synchronization primitives
//!
//! Run with: cargo bench -p tether-core
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tether_core::{EngineObjects, LevelMeter, MeterSettings, event_stack, peak_ring_buffer};

const SAMPLE_RATE: f32 = 48000.0;
const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512, 1024];

fn generate_test_signal(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE;
            (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5
        })
        .collect()
}

fn bench_event_stack(c: &mut Criterion) {
    let mut group = c.benchmark_group("EventStack");

    group.bench_function("push", |b| {
        let (mut tx, _rx) = event_stack::<u64, 1024>();
        let mut n = 0u64;
        b.iter(|| {
            tx.push(black_box(n));
            n = n.wrapping_add(1);
        });
    });

    for &count in &[16usize, 256, 1024] {
        group.bench_with_input(
            BenchmarkId::new("swap_and_drain", count),
            &count,
            |b, &count| {
                let (mut tx, mut rx) = event_stack::<u64, 1024>();
                b.iter(|| {
                    for n in 0..count as u64 {
                        tx.push(n);
                    }
                    let mut sum = 0u64;
                    for v in rx.drain() {
                        sum = sum.wrapping_add(v);
                    }
                    black_box(sum)
                });
            },
        );
    }

    group.finish();
}

fn bench_peak(c: &mut Criterion) {
    let mut group = c.benchmark_group("PeakRingBuffer");

    for &block_size in BLOCK_SIZES {
        let input = generate_test_signal(block_size);

        group.bench_with_input(
            BenchmarkId::new("write_stereo", block_size),
            &block_size,
            |b, &block_size| {
                let (mut writer, _reader) = peak_ring_buffer(MeterSettings::default());
                writer.reset(SAMPLE_RATE, block_size, 2);
                b.iter(|| writer.write(black_box(&[&input[..], &input[..]])));
            },
        );

        group.bench_with_input(
            BenchmarkId::new("get_peak_stereo", block_size),
            &block_size,
            |b, &block_size| {
                let (mut writer, mut reader) = peak_ring_buffer(MeterSettings::default());
                writer.reset(SAMPLE_RATE, block_size, 2);
                let mut out = [0.0f32; 2];
                b.iter(|| {
                    writer.write(&[&input[..], &input[..]]);
                    reader.get_peak_into(&mut out);
                    black_box(out)
                });
            },
        );
    }

    group.bench_function("level_meter_update", |b| {
        let mut meter = LevelMeter::for_rate(2, SAMPLE_RATE, 60.0);
        b.iter(|| meter.update(black_box(&[0.5, 0.25])));
    });

    group.finish();
}

fn bench_weak_ref(c: &mut Criterion) {
    let mut group = c.benchmark_group("WeakRef");

    group.bench_function("get_live", |b| {
        let engine = EngineObjects::new();
        let id = engine.insert(1.0f32);
        let weak = engine.weak_ref(id);
        b.iter(|| black_box(weak.get().map(|v| *v)));
    });

    group.bench_function("create_and_drop", |b| {
        let engine = EngineObjects::new();
        let id = engine.insert(1.0f32);
        b.iter(|| black_box(engine.weak_ref(id)));
    });

    group.bench_function("remove_with_16_refs", |b| {
        let engine = EngineObjects::new();
        b.iter(|| {
            let id = engine.insert(0u32);
            let refs: Vec<_> = (0..16).map(|_| engine.weak_ref(id)).collect();
            engine.remove(id);
            black_box(refs)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_event_stack, bench_peak, bench_weak_ref);
criterion_main!(benches);
