//! Engine Integration Tests
//!
//! Drive `WfsEngine` the way an audio driver would: push every input, pull
//! every output, once per callback.

use std::time::{Duration, Instant};

use approx::assert_abs_diff_eq;
use wfs_core::{EngineConfig, ProcessingMode, Route, RoutingSnapshot, Sample};
use wfs_realtime::{ProcessorState, WfsEngine};

const SAMPLE_RATE: f64 = 48000.0;
const DRIVER_BLOCK: usize = 256;

fn engine(mode: ProcessingMode, inputs: usize, outputs: usize) -> WfsEngine {
    let mut engine = WfsEngine::new().unwrap();
    engine
        .prepare_to_play(EngineConfig {
            mode,
            binaural: false,
            ..EngineConfig::new(SAMPLE_RATE, DRIVER_BLOCK, inputs, outputs)
        })
        .unwrap();
    engine
}

fn single_route(route: Route) -> RoutingSnapshot {
    let mut snapshot = RoutingSnapshot::new(1, 1);
    snapshot.set_direct(0, 0, route).unwrap();
    snapshot
}

/// Render `input` through channel 0 with the processor threads stopped
fn render_offline(engine: &mut WfsEngine, input: &[Sample]) -> Vec<Sample> {
    let mut rendered = Vec::with_capacity(input.len());
    let mut out = vec![0.0; DRIVER_BLOCK];
    for chunk in input.chunks(DRIVER_BLOCK) {
        engine.push_input(0, chunk);
        engine.process_pending();
        let n = engine.pull_output(0, &mut out[..chunk.len()]);
        rendered.extend_from_slice(&out[..n]);
    }
    rendered
}

fn impulse(len: usize) -> Vec<Sample> {
    let mut signal = vec![0.0; len];
    signal[0] = 1.0;
    signal
}

// ═══════════════════════════════════════════════════════════════════════════════
// END TO END
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_impulse_at_10ms_lands_at_480() {
    for mode in [ProcessingMode::InputBuffer, ProcessingMode::OutputBuffer] {
        let mut engine = engine(mode, 1, 1);
        engine
            .publish_routing(single_route(Route::new(10.0, 1.0, 0.0)))
            .unwrap();

        let out = render_offline(&mut engine, &impulse(2048));
        assert_eq!(out.len(), 2048);

        let peak = out
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map(|(n, _)| n)
            .unwrap();
        assert_eq!(peak, 480, "{mode:?}");
        assert_abs_diff_eq!(out[480], 1.0, epsilon = 1e-4);
        let rest: f32 = out
            .iter()
            .enumerate()
            .filter(|(n, _)| *n != 480)
            .map(|(_, s)| s.abs())
            .sum();
        assert!(rest < 1e-3, "{mode:?} leaked {rest}");
    }
}

#[test]
fn test_steady_state_amplitude_is_level() {
    let level = 0.8;
    for mode in [ProcessingMode::InputBuffer, ProcessingMode::OutputBuffer] {
        for delay_ms in [0.0, 1.0, 10.5, 100.0, 500.0, 998.0] {
            let mut engine = engine(mode, 1, 1);
            engine
                .publish_routing(single_route(Route::new(delay_ms, level, 0.0)))
                .unwrap();

            let len = (delay_ms as f64 * 48.0) as usize + 4 * DRIVER_BLOCK;
            let out = render_offline(&mut engine, &vec![1.0; len]);
            let tail = &out[out.len() - DRIVER_BLOCK..];
            for &s in tail {
                assert_abs_diff_eq!(s, level, epsilon = 1e-3);
            }
        }
    }
}

#[test]
fn test_threaded_render_matches_offline() {
    let mut engine = engine(ProcessingMode::OutputBuffer, 1, 1);
    engine
        .publish_routing(single_route(Route::new(10.0, 1.0, 0.0)))
        .unwrap();
    engine.start_processing().unwrap();

    let input = impulse(2048);
    let mut rendered = Vec::new();
    let mut out = vec![0.0; DRIVER_BLOCK];
    let mut pushed = 0;
    let deadline = Instant::now() + Duration::from_secs(5);

    while rendered.len() < input.len() && Instant::now() < deadline {
        if pushed < input.len() && pushed - rendered.len() < 2 * DRIVER_BLOCK {
            engine.push_input(0, &input[pushed..pushed + DRIVER_BLOCK]);
            pushed += DRIVER_BLOCK;
        }
        let n = engine.pull_output(0, &mut out);
        rendered.extend_from_slice(&out[..n]);
        std::thread::sleep(Duration::from_micros(200));
    }
    engine.stop_processing().unwrap();

    assert_eq!(rendered.len(), input.len());
    assert_abs_diff_eq!(rendered[480], 1.0, epsilon = 1e-4);
}

// ═══════════════════════════════════════════════════════════════════════════════
// PUSH / PULL CONTRACT
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_round_trip_counts() {
    let mut engine = engine(ProcessingMode::OutputBuffer, 1, 1);
    engine
        .publish_routing(single_route(Route::new(0.0, 1.0, 0.0)))
        .unwrap();

    // 100 samples is one full 64-sample block plus a remainder
    let mut out = [7.0; 100];
    engine.push_input(0, &[0.5; 100]);
    engine.process_pending();
    let n = engine.pull_output(0, &mut out);
    assert!(n < 100);
    assert_eq!(n, 64);

    // Once enough is buffered, k in gives k out
    engine.push_input(0, &[0.5; 100]);
    engine.process_pending();
    assert_eq!(engine.pull_output(0, &mut out), 100);
}

#[test]
fn test_process_block_zero_pads_shortfall() {
    let mut engine = engine(ProcessingMode::InputBuffer, 1, 2);
    let mut snapshot = RoutingSnapshot::new(1, 2);
    snapshot.set_direct(0, 0, Route::new(0.0, 1.0, 0.0)).unwrap();
    engine.publish_routing(snapshot).unwrap();

    let input: &[Sample] = &[1.0; 48];
    let mut left = [9.0; 48];
    let mut right = [9.0; 48];
    {
        let mut outputs: [&mut [Sample]; 2] = [&mut left, &mut right];
        engine.process_block(&[input], &mut outputs);
    }
    // Less than one processing block queued: nothing rendered yet
    assert!(left.iter().all(|&s| s == 0.0));
    assert!(right.iter().all(|&s| s == 0.0));
}

#[test]
fn test_reset_is_idempotent() {
    let mut engine = engine(ProcessingMode::OutputBuffer, 1, 1);
    engine
        .publish_routing(single_route(Route::new(5.0, 1.0, 0.0)))
        .unwrap();

    // Leave a tail in the delay line and samples in the rings
    engine.push_input(0, &[1.0; 256]);
    engine.process_pending();

    engine.reset().unwrap();
    let once = render_offline(&mut engine, &vec![0.0; 1024]);
    assert!(once.iter().all(|&s| s == 0.0));

    engine.reset().unwrap();
    engine.reset().unwrap();
    let twice = render_offline(&mut engine, &vec![0.0; 1024]);
    assert_eq!(once, twice);
}

#[test]
fn test_reset_while_running_keeps_running() {
    let mut engine = engine(ProcessingMode::InputBuffer, 2, 2);
    engine.start_processing().unwrap();
    engine.reset().unwrap();
    assert!(engine
        .diagnostics()
        .iter()
        .all(|d| d.state == ProcessorState::Running));
    engine.stop_processing().unwrap();
}

#[test]
fn test_disabled_engine_is_silent() {
    let mut engine = engine(ProcessingMode::OutputBuffer, 1, 1);
    engine
        .publish_routing(single_route(Route::new(0.0, 1.0, 0.0)))
        .unwrap();
    engine.set_enabled(false);

    let out = render_offline(&mut engine, &vec![1.0; 512]);
    assert_eq!(out.len(), 512);
    assert!(out.iter().all(|&s| s == 0.0));
    assert!(engine.diagnostics().iter().all(|d| !d.enabled));
}

#[test]
fn test_binaural_pair_is_rendered() {
    let mut engine = WfsEngine::new().unwrap();
    engine
        .prepare_to_play(EngineConfig::new(SAMPLE_RATE, DRIVER_BLOCK, 1, 1))
        .unwrap();

    let mut snapshot = RoutingSnapshot::new(1, 1);
    snapshot
        .set_binaural(
            0,
            wfs_core::BinauralRoute {
                delay_ms: [0.0, 1.0],
                level: [1.0, 0.5],
                hf_atten_db: [0.0, 0.0],
            },
        )
        .unwrap();
    engine.publish_routing(snapshot).unwrap();

    engine.push_input(0, &impulse(DRIVER_BLOCK));
    engine.process_pending();

    let mut left = [0.0; DRIVER_BLOCK];
    let mut right = [0.0; DRIVER_BLOCK];
    assert_eq!(engine.pull_binaural(0, &mut left), DRIVER_BLOCK);
    assert_eq!(engine.pull_binaural(1, &mut right), DRIVER_BLOCK);
    assert_abs_diff_eq!(left[0], 1.0, epsilon = 1e-4);
    assert_abs_diff_eq!(right[48], 0.5, epsilon = 1e-4);
}

#[test]
fn test_diagnostics_report_load() {
    let mut engine = engine(ProcessingMode::OutputBuffer, 2, 2);
    engine.push_input(0, &[0.0; 256]);
    engine.push_input(1, &[0.0; 256]);
    engine.process_pending();

    let diagnostics = engine.diagnostics();
    assert_eq!(diagnostics.len(), 2);
    for d in diagnostics {
        assert!(d.name.starts_with("wfs-out-"));
        assert!(d.cpu_usage_percent >= 0.0);
        assert!(d.processing_time_us >= 0.0);
    }
}

#[test]
fn test_pool_sized_by_config() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let mut engine = WfsEngine::new().unwrap();
    assert_eq!(engine.pool_workers(), 0);
    engine
        .prepare_to_play(EngineConfig {
            pool_workers: 3,
            ..EngineConfig::new(SAMPLE_RATE, DRIVER_BLOCK, 2, 2)
        })
        .unwrap();
    assert_eq!(engine.pool_workers(), 3);

    let hits: Vec<AtomicUsize> = (0..64).map(|_| AtomicUsize::new(0)).collect();
    engine.parallel_for(hits.len(), |i| {
        hits[i].fetch_add(1, Ordering::Relaxed);
    });
    assert!(hits.iter().all(|h| h.load(Ordering::Relaxed) == 1));

    engine
        .prepare_to_play(EngineConfig {
            pool_workers: 1,
            ..EngineConfig::new(SAMPLE_RATE, DRIVER_BLOCK, 2, 2)
        })
        .unwrap();
    assert_eq!(engine.pool_workers(), 1);

    engine.release_resources().unwrap();
    assert_eq!(engine.pool_workers(), 0);
}
