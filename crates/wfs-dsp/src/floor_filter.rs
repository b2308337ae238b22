//! Floor reflection coloration filter
//!
//! A floor bounce loses low end (the reflecting surface is small compared to
//! long wavelengths) and its top end depends on the floor material. Each
//! input's reflected path therefore runs through a low cut and a high shelf,
//! both instances of this filter.

use serde::{Deserialize, Serialize};
use wfs_core::Sample;

use crate::biquad::{Biquad, BiquadCoeffs};
use crate::{
    MAX_GAIN_DB, MAX_SLOPE, MIN_GAIN_DB, MIN_SLOPE, MonoProcessor, Processor, clamp_frequency,
};

/// Filter response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterKind {
    /// Second-order Butterworth high-pass
    #[default]
    LowCut,
    /// Cookbook high shelf with variable slope
    HighShelf,
}

/// General-purpose biquad for the reflected path
#[derive(Debug, Clone)]
pub struct FloorFilter {
    section: Biquad,
    kind: FilterKind,
    frequency: f32,
    gain_db: f32,
    slope: f32,
    sample_rate: f64,
}

impl FloorFilter {
    pub fn new(kind: FilterKind, sample_rate: f64) -> Self {
        let frequency = match kind {
            FilterKind::LowCut => 100.0,
            FilterKind::HighShelf => 3000.0,
        };
        let mut filter = Self {
            section: Biquad::default(),
            kind,
            frequency,
            gain_db: 0.0,
            slope: 0.5,
            sample_rate,
        };
        filter.update_coeffs();
        filter
    }

    pub fn low_cut(sample_rate: f64) -> Self {
        Self::new(FilterKind::LowCut, sample_rate)
    }

    pub fn high_shelf(sample_rate: f64) -> Self {
        Self::new(FilterKind::HighShelf, sample_rate)
    }

    /// Reset history and recompute coefficients for a new sample rate
    pub fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.frequency = clamp_frequency(self.frequency, sample_rate);
        self.section.reset();
        self.update_coeffs();
    }

    /// Corner frequency, clamped to 20 Hz - 20 kHz (and below Nyquist)
    pub fn set_frequency(&mut self, freq: f32) {
        if !freq.is_finite() {
            return;
        }
        let freq = clamp_frequency(freq, self.sample_rate);
        if freq != self.frequency {
            self.frequency = freq;
            self.update_coeffs();
        }
    }

    /// Shelf gain, clamped to -24 .. +12 dB. Ignored by the low cut.
    pub fn set_gain_db(&mut self, gain_db: f32) {
        if !gain_db.is_finite() {
            return;
        }
        let gain_db = gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
        if gain_db != self.gain_db {
            self.gain_db = gain_db;
            if self.kind == FilterKind::HighShelf {
                self.update_coeffs();
            }
        }
    }

    /// Shelf slope, clamped to 0.1 .. 0.9. Ignored by the low cut.
    pub fn set_slope(&mut self, slope: f32) {
        if !slope.is_finite() {
            return;
        }
        let slope = slope.clamp(MIN_SLOPE, MAX_SLOPE);
        if slope != self.slope {
            self.slope = slope;
            if self.kind == FilterKind::HighShelf {
                self.update_coeffs();
            }
        }
    }

    /// Set all shelf parameters at once, recomputing at most once.
    /// Clamping and non-finite handling match the single setters.
    pub fn set_shelf(&mut self, freq: f32, gain_db: f32, slope: f32) {
        let mut changed = false;
        if freq.is_finite() {
            let freq = clamp_frequency(freq, self.sample_rate);
            changed |= freq != self.frequency;
            self.frequency = freq;
        }
        if gain_db.is_finite() {
            let gain_db = gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
            changed |= gain_db != self.gain_db && self.kind == FilterKind::HighShelf;
            self.gain_db = gain_db;
        }
        if slope.is_finite() {
            let slope = slope.clamp(MIN_SLOPE, MAX_SLOPE);
            changed |= slope != self.slope && self.kind == FilterKind::HighShelf;
            self.slope = slope;
        }
        if changed {
            self.update_coeffs();
        }
    }

    pub fn set_type(&mut self, kind: FilterKind) {
        if kind != self.kind {
            self.kind = kind;
            self.update_coeffs();
        }
    }

    #[inline]
    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    #[inline]
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    #[inline]
    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    #[inline]
    pub fn slope(&self) -> f32 {
        self.slope
    }

    #[inline]
    pub fn coeffs(&self) -> &BiquadCoeffs {
        self.section.coeffs()
    }

    fn update_coeffs(&mut self) {
        let freq = self.frequency as f64;
        let coeffs = match self.kind {
            FilterKind::LowCut => BiquadCoeffs::low_cut(freq, self.sample_rate),
            FilterKind::HighShelf => BiquadCoeffs::high_shelf_slope(
                freq,
                self.slope as f64,
                self.gain_db as f64,
                self.sample_rate,
            ),
        };
        self.section.set_coeffs(coeffs);
    }
}

impl Processor for FloorFilter {
    fn reset(&mut self) {
        self.section.reset();
    }
}

impl MonoProcessor for FloorFilter {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        self.section.process_sample(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_high_shelf_zero_db_is_identity() {
        let mut filter = FloorFilter::high_shelf(48000.0);
        filter.set_frequency(2500.0);
        filter.set_slope(0.3);
        let input: Vec<f32> = (0..256).map(|n| ((n * 7 % 13) as f32 - 6.0) / 6.0).collect();
        let mut output = input.clone();
        filter.process_block(&mut output);
        for (x, y) in input.iter().zip(&output) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_parameters_are_clamped() {
        let mut filter = FloorFilter::high_shelf(48000.0);
        filter.set_frequency(5.0);
        assert_eq!(filter.frequency(), 20.0);
        filter.set_frequency(50000.0);
        assert_eq!(filter.frequency(), 20000.0);
        filter.set_gain_db(-100.0);
        assert_eq!(filter.gain_db(), -24.0);
        filter.set_slope(2.0);
        assert_eq!(filter.slope(), 0.9);
        filter.set_slope(0.0);
        assert_eq!(filter.slope(), 0.1);
    }

    #[test]
    fn test_frequency_below_nyquist_at_low_rates() {
        let mut filter = FloorFilter::low_cut(16000.0);
        filter.set_frequency(20000.0);
        assert!(filter.frequency() < 8000.0);
    }

    #[test]
    fn test_recompute_only_on_change() {
        let mut filter = FloorFilter::high_shelf(48000.0);
        filter.set_gain_db(-6.0);
        let before = *filter.coeffs();
        filter.set_gain_db(-6.0);
        filter.set_frequency(filter.frequency());
        assert_eq!(*filter.coeffs(), before);
    }

    #[test]
    fn test_low_cut_ignores_gain() {
        let mut filter = FloorFilter::low_cut(48000.0);
        let before = *filter.coeffs();
        filter.set_gain_db(-12.0);
        assert_eq!(*filter.coeffs(), before);
    }

    #[test]
    fn test_set_type_switches_response() {
        let mut filter = FloorFilter::low_cut(48000.0);
        filter.set_type(FilterKind::HighShelf);
        assert_eq!(filter.kind(), FilterKind::HighShelf);
        // 0 dB shelf passes DC, the low cut would not
        let mut out = 0.0;
        for _ in 0..2000 {
            out = filter.process_sample(1.0);
        }
        assert_abs_diff_eq!(out, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_set_shelf_matches_single_setters() {
        let mut combined = FloorFilter::high_shelf(48000.0);
        combined.set_shelf(4500.0, -7.5, 0.7);

        let mut single = FloorFilter::high_shelf(48000.0);
        single.set_frequency(4500.0);
        single.set_gain_db(-7.5);
        single.set_slope(0.7);

        assert_eq!(*combined.coeffs(), *single.coeffs());
        assert_eq!(combined.frequency(), 4500.0);
        assert_eq!(combined.gain_db(), -7.5);
        assert_eq!(combined.slope(), 0.7);
    }

    #[test]
    fn test_set_shelf_clamps_and_skips_nan() {
        let mut filter = FloorFilter::high_shelf(48000.0);
        filter.set_shelf(f32::NAN, -100.0, 2.0);
        assert_eq!(filter.frequency(), 3000.0);
        assert_eq!(filter.gain_db(), -24.0);
        assert_eq!(filter.slope(), 0.9);

        let before = *filter.coeffs();
        filter.set_shelf(3000.0, -24.0, 0.9);
        assert_eq!(*filter.coeffs(), before);
    }

    #[test]
    fn test_nan_ignored() {
        let mut filter = FloorFilter::low_cut(48000.0);
        filter.set_frequency(f32::NAN);
        assert_eq!(filter.frequency(), 100.0);
    }
}
