use std::sync::Arc;

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use hapbridge_core::compensation::{DurationCap, PulseCompensation};
use hapbridge_core::mocks::{NullActuator, NullTracker};
use hapbridge_core::pattern::{ChannelConfig, PatternKind, combine};
use hapbridge_core::slot::TargetSlot;
use hapbridge_core::{CompensationCfg, ConfigStore, Device, FeedbackCfg, FeedbackLoop, LoopDeps};
use hapbridge_traits::{Clock, MonotonicClock};

// Synthetic input trace: slow sine with xorshift noise, clamped to [0, 1].
fn synth_trace(n: usize, noise_amp: f32, seed: u32) -> Vec<f32> {
    let mut state = seed.max(1);
    let mut next_f32 = || {
        let mut x = state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        state = x;
        (x as f32) / (u32::MAX as f32 + 1.0)
    };
    (0..n)
        .map(|i| {
            let t = i as f32 / 200.0;
            let s = t.sin().mul_add(0.5, 0.5);
            (s + (next_f32() * 2.0 - 1.0) * noise_amp).clamp(0.0, 1.0)
        })
        .collect()
}

fn bench_combine(c: &mut Criterion) {
    let trace = synth_trace(4096, 0.05, 7);
    let mut group = c.benchmark_group("combine");
    for kind in PatternKind::ALL {
        let channels = [
            ChannelConfig::new(kind, 10, 90, 4),
            ChannelConfig::new(PatternKind::Linear, 40, 80, 16),
        ];
        group.bench_function(kind.name(), |b| {
            b.iter(|| {
                let mut prev = 0.0;
                let mut acc = 0.0;
                for (i, v) in trace.iter().enumerate() {
                    acc += combine(&channels, *v, *v - prev, i as f64 * 0.05);
                    prev = *v;
                }
                black_box(acc)
            });
        });
    }
    group.finish();
}

fn bench_cap(c: &mut Criterion) {
    c.bench_function("duration_cap_plan", |b| {
        b.iter_batched(
            || DurationCap::new(4.0, 1000.0),
            |mut cap| {
                let mut carry = 0.0;
                for i in 0..1024 {
                    let requested = (i % 60) as f32;
                    let plan = cap.plan("bench", requested.max(carry));
                    carry = plan.carry_ms;
                    black_box(cap.to_native_units(plan.emit_ms));
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_step(c: &mut Criterion) {
    let clock = MonotonicClock::new();
    let slot = Arc::new(TargetSlot::new());
    let deps = LoopDeps {
        tracker: Arc::new(NullTracker),
        actuator: Arc::new(NullActuator),
        config: Arc::new(ConfigStore::default()),
        clock: Arc::new(clock),
    };
    let mut fl = FeedbackLoop::new(
        Device::new(0, "VIVE Tracker 3.0 MV", "BENCH"),
        slot.clone(),
        deps,
        FeedbackCfg::default(),
        &CompensationCfg {
            unit_scale: 1000.0,
            cap_units: Some(4000),
        },
        clock.now(),
    );
    let trace = synth_trace(1024, 0.02, 11);
    let mut i = 0usize;
    c.bench_function("feedback_step", |b| {
        b.iter(|| {
            slot.set_target(trace[i % trace.len()], clock.now());
            i += 1;
            black_box(fl.step())
        });
    });
}

criterion_group!(benches, bench_combine, bench_cap, bench_step);
criterion_main!(benches);
