//! Air absorption
//!
//! High frequencies lose more energy over distance than lows. The renderer
//! models that with a single broad high shelf at 800 Hz (Q 0.3); the
//! calculation engine supplies only the shelf gain per route.

use wfs_core::Sample;

use crate::biquad::{Biquad, BiquadCoeffs};
use crate::{MAX_GAIN_DB, MIN_GAIN_DB, MonoProcessor, Processor};

/// Shelf corner frequency (Hz)
pub const AIR_ABSORPTION_FREQ: f64 = 800.0;
/// Shelf Q
pub const AIR_ABSORPTION_Q: f64 = 0.3;

/// Fixed-corner high shelf with variable gain
#[derive(Debug, Clone)]
pub struct AirAbsorptionFilter {
    section: Biquad,
    gain_db: f32,
    sample_rate: f64,
}

impl Default for AirAbsorptionFilter {
    fn default() -> Self {
        Self::new(48000.0)
    }
}

impl AirAbsorptionFilter {
    pub fn new(sample_rate: f64) -> Self {
        let mut filter = Self {
            section: Biquad::default(),
            gain_db: 0.0,
            sample_rate,
        };
        filter.update_coeffs();
        filter
    }

    /// Reset history and recompute coefficients for a new sample rate
    pub fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.section.reset();
        self.update_coeffs();
    }

    /// Set shelf gain. Recomputes only when the clamped value changes.
    #[inline]
    pub fn set_gain_db(&mut self, gain_db: f32) {
        let gain_db = if gain_db.is_finite() {
            gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB)
        } else {
            0.0
        };
        if gain_db != self.gain_db {
            self.gain_db = gain_db;
            self.update_coeffs();
        }
    }

    #[inline]
    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    #[inline]
    pub fn coeffs(&self) -> &BiquadCoeffs {
        self.section.coeffs()
    }

    fn update_coeffs(&mut self) {
        self.section.set_coeffs(BiquadCoeffs::high_shelf(
            AIR_ABSORPTION_FREQ,
            AIR_ABSORPTION_Q,
            self.gain_db as f64,
            self.sample_rate,
        ));
    }
}

impl Processor for AirAbsorptionFilter {
    fn reset(&mut self) {
        self.section.reset();
    }
}

impl MonoProcessor for AirAbsorptionFilter {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        self.section.process_sample(input)
    }
}
