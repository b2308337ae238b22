//! wfs-core: Shared types, configuration and routing data for the WFS renderer
//!
//! This crate provides the foundational types used by the DSP and real-time
//! crates. It has no threads and no audio-path code of its own.

mod config;
mod error;
mod routing;

pub use config::*;
pub use error::*;
pub use routing::*;

/// Type alias for audio samples (the driver delivers 32-bit float)
pub type Sample = f32;

/// Number of samples a channel processor consumes per iteration
pub const PROCESSING_BLOCK_SIZE: usize = 64;

/// Length of every delay line, in seconds of audio
pub const DELAY_LINE_SECONDS: f64 = 1.0;

/// Ring buffer capacity as a multiple of the driver's maximum block size
pub const RING_CAPACITY_BLOCKS: usize = 4;

/// Upper bound on the binaural processor's block size
pub const MAX_BINAURAL_BLOCK_SIZE: usize = 512;

/// How long `stop` waits for a processor thread before giving up
pub const SHUTDOWN_TIMEOUT_MS: u64 = 1000;

/// Convert milliseconds to (fractional) samples
#[inline]
pub fn ms_to_samples(ms: f32, sample_rate: f64) -> f32 {
    (ms as f64 / 1000.0 * sample_rate) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ms_to_samples() {
        assert_relative_eq!(ms_to_samples(10.0, 48000.0), 480.0, epsilon = 1e-3);
        assert_eq!(ms_to_samples(0.0, 48000.0), 0.0);
    }
}
