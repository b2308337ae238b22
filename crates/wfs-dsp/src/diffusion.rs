//! Floor reflection diffusion
//!
//! A real floor is not a mirror: the reflected arrival smears slightly in
//! time. Each input's reflected delay gets a small random offset that wanders
//! smoothly. Once per processing block the offset moves 5 % of the way toward
//! its target; every third block a new target is drawn uniformly from
//! `±diffusion_percent × 0.05 ms`.
//!
//! When the diffusion amount drops, the permitted range follows it down with
//! the same smoothing instead of snapping, so the offset never jumps.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Jitter range per percent of diffusion (ms)
pub const JITTER_MS_PER_PERCENT: f32 = 0.05;
/// Blocks between new random targets
pub const TARGET_INTERVAL_BLOCKS: u32 = 3;
/// Per-block exponential smoothing factor
pub const SMOOTHING_FACTOR: f32 = 0.05;

/// Maximum jitter for a diffusion setting (ms)
#[inline]
pub fn max_jitter_ms(diffusion_percent: f32) -> f32 {
    let percent = if diffusion_percent.is_finite() {
        diffusion_percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    percent * JITTER_MS_PER_PERCENT
}

/// Smoothed random delay offsets, one per input
#[derive(Debug, Clone)]
pub struct DiffusionJitter {
    current_ms: Vec<f32>,
    target_ms: Vec<f32>,
    limit_ms: Vec<f32>,
    block_counter: u32,
    rng: ChaCha8Rng,
}

impl DiffusionJitter {
    pub fn new(num_inputs: usize, seed: u64) -> Self {
        Self {
            current_ms: vec![0.0; num_inputs],
            target_ms: vec![0.0; num_inputs],
            limit_ms: vec![0.0; num_inputs],
            block_counter: 0,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.current_ms.len()
    }

    /// Zero all offsets and restart the target schedule
    pub fn reset(&mut self) {
        self.current_ms.fill(0.0);
        self.target_ms.fill(0.0);
        self.limit_ms.fill(0.0);
        self.block_counter = 0;
    }

    /// Advance one processing block. `diffusion_percent(input)` supplies the
    /// current setting for each input.
    pub fn advance_block(&mut self, mut diffusion_percent: impl FnMut(usize) -> f32) {
        let redraw = self.block_counter % TARGET_INTERVAL_BLOCKS == 0;
        self.block_counter = self.block_counter.wrapping_add(1);

        for input in 0..self.current_ms.len() {
            let max = max_jitter_ms(diffusion_percent(input));

            let limit = &mut self.limit_ms[input];
            if max >= *limit {
                *limit = max;
            } else {
                *limit += SMOOTHING_FACTOR * (max - *limit);
            }
            let limit = *limit;

            let target = &mut self.target_ms[input];
            if redraw {
                *target = if max > 0.0 {
                    self.rng.random_range(-max..=max)
                } else {
                    0.0
                };
            } else {
                *target = target.clamp(-max, max);
            }

            let current = &mut self.current_ms[input];
            *current += SMOOTHING_FACTOR * (*target - *current);
            *current = current.clamp(-limit, limit);
        }
    }

    /// Current offset for an input (ms), 0 when out of range
    #[inline]
    pub fn current_ms(&self, input: usize) -> f32 {
        self.current_ms.get(input).copied().unwrap_or(0.0)
    }

    /// Range the offset is currently held to (ms)
    #[inline]
    pub fn limit_ms(&self, input: usize) -> f32 {
        self.limit_ms.get(input).copied().unwrap_or(0.0)
    }
}
