//! Processor load measurement
//!
//! Each processor thread times every block it renders and folds the result
//! into exponential averages with a 200 ms time constant. Only the processor
//! thread writes; any thread may read.

use std::time::Duration;

use portable_atomic::{AtomicF32, AtomicU64, Ordering};

/// Averaging time constant (seconds)
pub const LOAD_WINDOW_SECONDS: f64 = 0.2;

pub struct LoadMeter {
    cpu_percent: AtomicF32,
    processing_us: AtomicF32,
    blocks: AtomicU64,
}

impl Default for LoadMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadMeter {
    pub const fn new() -> Self {
        Self {
            cpu_percent: AtomicF32::new(0.0),
            processing_us: AtomicF32::new(0.0),
            blocks: AtomicU64::new(0),
        }
    }

    /// Record one block that took `elapsed` to render and holds
    /// `block_seconds` of audio
    pub fn record(&self, elapsed: Duration, block_seconds: f64) {
        if block_seconds <= 0.0 {
            return;
        }
        let alpha = (1.0 - (-block_seconds / LOAD_WINDOW_SECONDS).exp()) as f32;
        let elapsed_s = elapsed.as_secs_f64();
        let cpu = (elapsed_s / block_seconds * 100.0) as f32;
        let us = (elapsed_s * 1e6) as f32;

        let smoothed = |cell: &AtomicF32, value: f32| {
            let old = cell.load(Ordering::Relaxed);
            cell.store(old + alpha * (value - old), Ordering::Relaxed);
        };
        smoothed(&self.cpu_percent, cpu);
        smoothed(&self.processing_us, us);
        self.blocks.fetch_add(1, Ordering::Relaxed);
    }

    /// Share of real time spent rendering (%)
    #[inline]
    pub fn cpu_usage_percent(&self) -> f32 {
        self.cpu_percent.load(Ordering::Relaxed)
    }

    /// Average time to render one block (µs)
    #[inline]
    pub fn processing_time_us(&self) -> f32 {
        self.processing_us.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn blocks_processed(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.cpu_percent.store(0.0, Ordering::Relaxed);
        self.processing_us.store(0.0, Ordering::Relaxed);
        self.blocks.store(0, Ordering::Relaxed);
    }
}
