//! Reverb algorithms
//!
//! Every algorithm implements [`ReverbAlgorithm`]. Geometry updates are
//! optional: the scattering delay network derives its delay lengths from the
//! room, the feedback delay network ignores geometry entirely.

mod fdn;
mod sdn;

pub use fdn::FdnReverb;
pub use sdn::SdnReverb;

use serde::{Deserialize, Serialize};
use wfs_core::Sample;

/// Speed of sound (m/s)
pub const SPEED_OF_SOUND: f32 = 343.0;

/// Control-rate reverb settings shared by all algorithms
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverbParameters {
    /// Time for the tail to decay by 60 dB (s)
    pub rt60_s: f32,
    /// High-frequency damping, 0 = bright, 1 = dark
    pub damping: f32,
    /// Wet output level (linear)
    pub wet: f32,
    /// Scales the FDN delay lengths (0.25 - 4)
    pub size: f32,
}

impl Default for ReverbParameters {
    fn default() -> Self {
        Self {
            rt60_s: 1.5,
            damping: 0.3,
            wet: 1.0,
            size: 1.0,
        }
    }
}

impl ReverbParameters {
    /// Bring every field into its accepted range
    pub fn clamped(self) -> Self {
        let or = |value: f32, fallback: f32| if value.is_finite() { value } else { fallback };
        Self {
            rt60_s: or(self.rt60_s, 1.5).clamp(0.05, 30.0),
            damping: or(self.damping, 0.3).clamp(0.0, 0.99),
            wet: or(self.wet, 1.0).clamp(0.0, 4.0),
            size: or(self.size, 1.0).clamp(0.25, 4.0),
        }
    }
}

/// Shoebox room with one source and one listener (metres, origin at a corner)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverbGeometry {
    pub room: [f32; 3],
    pub source: [f32; 3],
    pub listener: [f32; 3],
    /// Wall absorption coefficient (0 - 1)
    pub absorption: f32,
}

impl Default for ReverbGeometry {
    fn default() -> Self {
        Self {
            room: [12.0, 8.0, 4.0],
            source: [3.0, 4.0, 1.5],
            listener: [8.0, 4.0, 1.5],
            absorption: 0.2,
        }
    }
}

/// Strategy interface for reverb algorithms
pub trait ReverbAlgorithm: Send {
    /// Allocate for a sample rate and maximum block size
    fn prepare(&mut self, sample_rate: f64, max_block_size: usize);

    /// Clear all internal state
    fn reset(&mut self);

    /// Render `input` into `output` (same length, overwritten)
    fn process_block(&mut self, input: &[Sample], output: &mut [Sample]);

    fn set_parameters(&mut self, params: &ReverbParameters);

    /// Room changed. Algorithms without a geometric model ignore this.
    fn update_geometry(&mut self, _geometry: &ReverbGeometry) {}
}

/// Tagged reverb choice
pub enum Reverb {
    Fdn(FdnReverb),
    Sdn(SdnReverb),
}

impl Reverb {
    pub fn fdn() -> Self {
        Self::Fdn(FdnReverb::new())
    }

    pub fn sdn() -> Self {
        Self::Sdn(SdnReverb::new())
    }

    fn algorithm(&mut self) -> &mut dyn ReverbAlgorithm {
        match self {
            Self::Fdn(reverb) => reverb as &mut dyn ReverbAlgorithm,
            Self::Sdn(reverb) => reverb,
        }
    }
}

impl ReverbAlgorithm for Reverb {
    fn prepare(&mut self, sample_rate: f64, max_block_size: usize) {
        self.algorithm().prepare(sample_rate, max_block_size);
    }

    fn reset(&mut self) {
        self.algorithm().reset();
    }

    fn process_block(&mut self, input: &[Sample], output: &mut [Sample]) {
        self.algorithm().process_block(input, output);
    }

    fn set_parameters(&mut self, params: &ReverbParameters) {
        self.algorithm().set_parameters(params);
    }

    fn update_geometry(&mut self, geometry: &ReverbGeometry) {
        self.algorithm().update_geometry(geometry);
    }
}

/// Feedback gain that gives `rt60_s` for a loop of `delay_samples`
#[inline]
pub(crate) fn decay_gain(delay_samples: usize, rt60_s: f32, sample_rate: f64) -> f32 {
    let seconds = delay_samples as f64 / sample_rate;
    10.0_f64.powf(-3.0 * seconds / rt60_s as f64) as f32
}
