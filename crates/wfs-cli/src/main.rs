//! WFS driver
//!
//! Usage:
//!   wfs impulse --delay-ms 10       - Report where a routed impulse lands
//!   wfs render --seconds 2          - Run the threaded engine on a sine
//!   wfs pool --nodes 32             - Time the reverb bank, pooled vs sequential

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;

use wfs_core::{EngineConfig, ProcessingMode, Route, RoutingSnapshot, Sample};
use wfs_dsp::reverb::ReverbParameters;
use wfs_realtime::{ParallelFor, ReverbKind, ReverbNodeBank, WfsEngine};

#[derive(Parser)]
#[command(name = "wfs", about = "WFS real-time core driver")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// One processor per input
    Input,
    /// One processor per loudspeaker
    Output,
}

impl From<Mode> for ProcessingMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Input => ProcessingMode::InputBuffer,
            Mode::Output => ProcessingMode::OutputBuffer,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Algorithm {
    Fdn,
    Sdn,
}

#[derive(Subcommand)]
enum Commands {
    /// Route one input to one output and report where an impulse lands
    Impulse {
        #[arg(long, value_enum, default_value = "output")]
        mode: Mode,
        #[arg(long, default_value_t = 10.0)]
        delay_ms: f32,
        #[arg(long, default_value_t = 1.0)]
        level: f32,
        /// High-frequency attenuation (dB, <= 0)
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        hf_atten_db: f32,
        #[arg(long, default_value_t = 48000.0)]
        sample_rate: f64,
    },
    /// Run the threaded engine on a sine and print per-processor diagnostics
    Render {
        /// Engine config (JSON). Defaults are used when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = 2.0)]
        seconds: f64,
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,
    },
    /// Time the reverb bank through the fork-join pool against the caller alone
    Pool {
        #[arg(long, default_value_t = 32)]
        nodes: usize,
        /// Pool workers (defaults to cores - 1)
        #[arg(long)]
        workers: Option<usize>,
        #[arg(long, default_value_t = 256)]
        block: usize,
        #[arg(long, default_value_t = 500)]
        iterations: usize,
        #[arg(long, value_enum, default_value = "fdn")]
        algorithm: Algorithm,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Impulse {
            mode,
            delay_ms,
            level,
            hf_atten_db,
            sample_rate,
        } => run_impulse(mode.into(), Route::new(delay_ms, level, hf_atten_db), sample_rate),
        Commands::Render {
            config,
            seconds,
            frequency,
        } => run_render(config, seconds, frequency),
        Commands::Pool {
            nodes,
            workers,
            block,
            iterations,
            algorithm,
        } => run_pool(nodes, workers, block, iterations, algorithm),
    }
}

// ============ Impulse ============

fn run_impulse(mode: ProcessingMode, route: Route, sample_rate: f64) -> Result<()> {
    let block = 256;
    let config = EngineConfig {
        mode,
        binaural: false,
        ..EngineConfig::new(sample_rate, block, 1, 1)
    };
    let length = config.delay_line_len() + 4 * block;

    let mut engine = WfsEngine::new().context("Failed to create engine")?;
    engine
        .prepare_to_play(config)
        .context("Failed to prepare engine")?;

    let mut snapshot = RoutingSnapshot::new(1, 1);
    snapshot.set_direct(0, 0, route)?;
    engine.publish_routing(snapshot)?;

    // Processor threads stay stopped; every block is rendered here
    let mut input = vec![0.0; block];
    let mut output = vec![0.0; block];
    let mut rendered: Vec<Sample> = Vec::with_capacity(length);
    while rendered.len() < length {
        input[0] = if rendered.is_empty() { 1.0 } else { 0.0 };
        engine.push_input(0, &input);
        engine.process_pending();
        let n = engine.pull_output(0, &mut output);
        rendered.extend_from_slice(&output[..n]);
    }

    let Some((peak_at, peak)) = rendered
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
    else {
        bail!("Engine rendered nothing");
    };

    let report = json!({
        "mode": format!("{mode:?}"),
        "delay_ms": route.delay_ms,
        "expected_sample": wfs_core::ms_to_samples(route.delay_ms, sample_rate),
        "peak_sample": peak_at,
        "peak_value": peak,
        "energy": rendered.iter().map(|s| s * s).sum::<f32>(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

// ============ Render ============

fn run_render(config: Option<PathBuf>, seconds: f64, frequency: f32) -> Result<()> {
    let config = match config {
        Some(path) => EngineConfig::load(&path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let block = config.max_block_size;
    let sample_rate = config.sample_rate;
    let num_inputs = config.num_inputs;
    let num_outputs = config.num_outputs;

    let mut engine = WfsEngine::new().context("Failed to create engine")?;
    engine
        .prepare_to_play(config)
        .context("Failed to prepare engine")?;

    // Fan every input out across the array with a growing delay
    let mut snapshot = RoutingSnapshot::new(num_inputs, num_outputs);
    let level = 1.0 / num_inputs as f32;
    for input in 0..num_inputs {
        for output in 0..num_outputs {
            let delay_ms = 2.0 * (input + output) as f32;
            snapshot.set_direct(input, output, Route::new(delay_ms, level, -1.5))?;
        }
    }
    engine.publish_routing(snapshot)?;
    engine
        .start_processing()
        .context("Failed to start processor threads")?;

    let total_blocks = (seconds * sample_rate / block as f64).ceil() as usize;
    log::info!("Rendering {seconds} s: {total_blocks} callbacks of {block} samples");
    let block_period = Duration::from_secs_f64(block as f64 / sample_rate);
    let phase_step = std::f32::consts::TAU * frequency / sample_rate as f32;

    let mut input = vec![0.0; block];
    let mut output = vec![0.0; block];
    let mut peaks = vec![0.0f32; num_outputs];
    let mut delivered = 0usize;
    let mut short_pulls = 0usize;
    let mut phase = 0.0f32;

    let started = Instant::now();
    for n in 0..total_blocks {
        for s in &mut input {
            *s = phase.sin() * 0.5;
            phase = (phase + phase_step) % std::f32::consts::TAU;
        }
        for channel in 0..num_inputs {
            engine.push_input(channel, &input);
        }

        // Pace like a driver callback
        let due = started + block_period * (n as u32 + 1);
        if let Some(wait) = due.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }

        for (channel, peak) in peaks.iter_mut().enumerate() {
            let got = engine.pull_output(channel, &mut output);
            if got < block {
                short_pulls += 1;
            }
            delivered += got;
            *peak = output[..got].iter().fold(*peak, |p, s| p.max(s.abs()));
        }
    }

    engine
        .stop_processing()
        .context("Failed to stop processor threads")?;

    let diagnostics: Vec<_> = engine
        .diagnostics()
        .into_iter()
        .map(|d| {
            json!({
                "name": d.name,
                "state": d.state.name(),
                "enabled": d.enabled,
                "cpu_usage_percent": d.cpu_usage_percent,
                "processing_time_us": d.processing_time_us,
            })
        })
        .collect();

    let report = json!({
        "blocks": total_blocks,
        "samples_delivered": delivered,
        "short_pulls": short_pulls,
        "output_peaks": peaks,
        "processors": diagnostics,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    engine
        .release_resources()
        .context("Failed to release engine")?;
    Ok(())
}

// ============ Pool ============

fn run_pool(
    nodes: usize,
    workers: Option<usize>,
    block: usize,
    iterations: usize,
    algorithm: Algorithm,
) -> Result<()> {
    if nodes == 0 || block == 0 || iterations == 0 {
        bail!("nodes, block and iterations must all be > 0");
    }
    let workers = workers.unwrap_or_else(EngineConfig::default_pool_workers);
    let kind = match algorithm {
        Algorithm::Fdn => ReverbKind::Fdn,
        Algorithm::Sdn => ReverbKind::Sdn,
    };

    let pool = ParallelFor::new(workers).context("Failed to spawn pool workers")?;
    let mut bank = ReverbNodeBank::new(nodes, kind, 48000.0, block, pool)?;
    let fill_inputs = |bank: &mut ReverbNodeBank| {
        for node in 0..nodes {
            if let Some(input) = bank.input_mut(node) {
                for (n, s) in input.iter_mut().enumerate() {
                    *s = if (n + node) % 97 == 0 { 1.0 } else { 0.0 };
                }
            }
        }
    };
    for node in 0..nodes {
        bank.set_parameters(node, &ReverbParameters::default());
    }
    fill_inputs(&mut bank);

    log::info!("Timing {nodes} nodes, {iterations} blocks of {block} on {workers} workers");
    let started = Instant::now();
    for _ in 0..iterations {
        bank.process_sequential(block);
    }
    let sequential = started.elapsed();

    bank.reset();
    fill_inputs(&mut bank);
    let started = Instant::now();
    for _ in 0..iterations {
        bank.process(block);
    }
    let pooled = started.elapsed();

    let block_us = block as f64 / 48000.0 * 1e6;
    let per_block = |total: Duration| total.as_secs_f64() * 1e6 / iterations as f64;
    let report = json!({
        "nodes": nodes,
        "workers": workers,
        "block": block,
        "block_budget_us": block_us,
        "sequential_us_per_block": per_block(sequential),
        "pooled_us_per_block": per_block(pooled),
        "speedup": sequential.as_secs_f64() / pooled.as_secs_f64().max(f64::EPSILON),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
