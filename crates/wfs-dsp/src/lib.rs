//! wfs-dsp: DSP building blocks for the WFS renderer
//!
//! Everything in here is single-threaded, allocation-free after construction
//! and safe to call from a processor thread.
//!
//! ## Modules
//! - `biquad` - cookbook coefficients and the direct-form-I section
//! - `air_absorption` - fixed 800 Hz high shelf with variable gain
//! - `floor_filter` - switchable low-cut / high-shelf for floor reflections
//! - `delay_line` - one-second circular buffer with fractional taps
//! - `diffusion` - smoothed random delay jitter for floor reflections
//! - `reverb` - FDN and SDN reverb algorithms behind one strategy trait

pub mod air_absorption;
pub mod biquad;
pub mod delay_line;
pub mod diffusion;
pub mod floor_filter;
pub mod reverb;

pub use air_absorption::AirAbsorptionFilter;
pub use biquad::{Biquad, BiquadCoeffs};
pub use delay_line::DelayLine;
pub use diffusion::DiffusionJitter;
pub use floor_filter::{FilterKind, FloorFilter};

use wfs_core::Sample;

/// Lowest frequency any filter accepts (Hz)
pub const MIN_FREQUENCY: f32 = 20.0;
/// Highest frequency any filter accepts (Hz)
pub const MAX_FREQUENCY: f32 = 20000.0;
/// Shelf gain range (dB)
pub const MIN_GAIN_DB: f32 = -24.0;
pub const MAX_GAIN_DB: f32 = 12.0;
/// Shelf slope range
pub const MIN_SLOPE: f32 = 0.1;
pub const MAX_SLOPE: f32 = 0.9;

/// Clamp a frequency to the accepted range and below Nyquist
#[inline]
pub fn clamp_frequency(freq: f32, sample_rate: f64) -> f32 {
    let nyquist_guard = (sample_rate * 0.49) as f32;
    freq.clamp(MIN_FREQUENCY, MAX_FREQUENCY.min(nyquist_guard).max(MIN_FREQUENCY))
}

/// Trait for all DSP processors
pub trait Processor: Send {
    /// Reset processor state
    fn reset(&mut self);
}

/// Mono processor trait
pub trait MonoProcessor: Processor {
    /// Process a single sample
    fn process_sample(&mut self, input: Sample) -> Sample;

    /// Process a block of samples in place
    fn process_block(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}
