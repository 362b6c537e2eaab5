//! Benchmarks for drift evaluation
//!
//! Tests performance of classifying drift and of the full snapshot path
//! through the state machine.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cowatch::clock::{Clock, ManualClock};
use cowatch::engine::HeadlessEngine;
use cowatch::session::LocalSession;
use cowatch::source::SourceLoader;
use cowatch::sync::{evaluate, DriftInput, DriftThresholds, SyncMachine};
use cowatch_core::config::{SourceConfig, SyncConfig};
use cowatch_core::{InboundMessage, PlaybackSnapshot};
use std::sync::Arc;

fn input(drift: f64, local_paused: bool, target_paused: bool) -> DriftInput {
    DriftInput {
        local_time: 600.0,
        target_time: 600.0 + drift,
        local_paused,
        target_paused,
        is_force: false,
        current_rate: 1.0,
    }
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    let thresholds = DriftThresholds::default();

    for (name, drift) in [
        ("in_sync", 0.1),
        ("soft", 1.2),
        ("hard", 8.0),
        ("behind_hard", -8.0),
    ] {
        let playing = input(drift, false, false);
        group.bench_with_input(BenchmarkId::new("playing", name), &playing, |b, i| {
            b.iter(|| evaluate(black_box(i), black_box(&thresholds)));
        });
    }

    let mismatch = input(2.0, true, false);
    group.bench_function("pause_mismatch", |b| {
        b.iter(|| evaluate(black_box(&mismatch), black_box(&thresholds)));
    });

    group.finish();
}

fn bench_snapshot_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_path");

    let clock = Arc::new(ManualClock::default());
    let (session, _outgoing) = LocalSession::new();
    session.connect();
    session.deliver(InboundMessage::Permissions {
        is_admin: false,
        user_controls_allowed: false,
        proxy_enabled: false,
    });
    let loader = Arc::new(SourceLoader::new(SourceConfig::default()).unwrap());
    let mut machine = SyncMachine::new(
        HeadlessEngine::new(),
        SyncConfig::default(),
        clock.clone(),
        session.clone(),
        loader,
    );

    let snapshot = |time: f64| PlaybackSnapshot {
        url: Some("https://cdn.example/a.mp4".into()),
        time,
        paused: false,
        timestamp: clock.wall_ms(),
        is_force: false,
    };
    machine.on_snapshot(snapshot(30.0));
    machine.pump_engine();

    group.bench_function("steady_state", |b| {
        b.iter(|| {
            machine.on_snapshot(black_box(snapshot(30.0)));
            machine.pump_engine();
            machine.engine_mut().take_commands();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_evaluate, bench_snapshot_path);
criterion_main!(benches);
