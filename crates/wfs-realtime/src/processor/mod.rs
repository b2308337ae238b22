//! Channel processors
//!
//! Three processor kinds share one lifecycle:
//!
//! - [`InputProcessor`] - one thread per input, delays read back from behind
//!   the write cursor, one output ring per loudspeaker
//! - [`OutputProcessor`] - one thread per loudspeaker, contributions written
//!   ahead of the read cursor, direct and floor reflection paths
//! - [`BinauralProcessor`] - one thread, stereo headphone render
//!
//! Each processor keeps the driver side of its rings and hands the other side
//! to its worker at prepare time.

mod binaural;
mod input;
mod output;

pub use binaural::{BinauralProcessor, BinauralWorker};
pub use input::{InputProcessor, InputWorker};
pub use output::{OutputProcessor, OutputWorker};

use wfs_core::{WfsError, WfsResult, ms_to_samples};

use crate::lifecycle::{ProcessorState, Worker, WorkerHost};

/// Lifecycle and diagnostics common to every processor
pub trait ChannelProcessor {
    /// Size everything for a sample rate and driver block size
    fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> WfsResult<()>;

    fn start(&mut self) -> WfsResult<()>;

    fn stop(&mut self) -> WfsResult<()>;

    /// Discard all transient audio on both sides of every ring. A running
    /// processor is stopped for the reset and restarted afterwards.
    fn reset(&mut self) -> WfsResult<()>;

    /// Stop the thread and free every buffer
    fn release(&mut self) -> WfsResult<()>;

    fn set_enabled(&self, enabled: bool);

    fn is_enabled(&self) -> bool;

    fn state(&self) -> ProcessorState;

    /// Thread name
    fn name(&self) -> &str;

    fn cpu_usage_percent(&self) -> f32;

    fn processing_time_us(&self) -> f32;

    /// Render queued blocks on the calling thread while the processor thread
    /// is not running. Used for offline rendering and deterministic tests.
    fn process_pending(&mut self) -> usize;
}

/// What each processor kind supplies; the lifecycle on top is shared
pub trait ProcessorParts {
    type Worker: Worker;

    fn host(&self) -> &WorkerHost<Self::Worker>;

    fn host_mut(&mut self) -> &mut WorkerHost<Self::Worker>;

    /// Allocate rings, delay lines and filters. Returns the thread half.
    fn build(&mut self, sample_rate: f64, max_block_size: usize) -> WfsResult<Self::Worker>;

    /// Discard whatever is queued on the driver side of the rings
    fn drain_rings(&mut self);

    /// Drop the driver side of the rings
    fn release_rings(&mut self);
}

impl<P: ProcessorParts> ChannelProcessor for P {
    fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> WfsResult<()> {
        let state = self.host().state();
        if state == ProcessorState::Running {
            return Err(WfsError::InvalidState {
                expected: "not running",
                actual: state.name(),
            });
        }
        let worker = self.build(sample_rate, max_block_size)?;
        self.host_mut().install(worker)
    }

    fn start(&mut self) -> WfsResult<()> {
        self.host_mut().start()
    }

    fn stop(&mut self) -> WfsResult<()> {
        self.host_mut().stop()
    }

    fn reset(&mut self) -> WfsResult<()> {
        let was_running = self.host().state() == ProcessorState::Running;
        if was_running {
            self.host_mut().stop()?;
        }
        self.host_mut().reset_worker();
        self.drain_rings();
        if was_running {
            self.host_mut().start()?;
        }
        Ok(())
    }

    fn release(&mut self) -> WfsResult<()> {
        let result = self.host_mut().release();
        self.release_rings();
        result
    }

    fn set_enabled(&self, enabled: bool) {
        self.host().control().set_enabled(enabled);
    }

    fn is_enabled(&self) -> bool {
        self.host().control().is_enabled()
    }

    fn state(&self) -> ProcessorState {
        self.host().state()
    }

    fn name(&self) -> &str {
        self.host().name()
    }

    fn cpu_usage_percent(&self) -> f32 {
        self.host().control().load().cpu_usage_percent()
    }

    fn processing_time_us(&self) -> f32 {
        self.host().control().load().processing_time_us()
    }

    fn process_pending(&mut self) -> usize {
        self.host_mut().process_pending()
    }
}

/// Routing delay in samples, clamped to `[0, max]`. Non-finite delays are 0.
#[inline]
pub(crate) fn delay_samples(delay_ms: f32, sample_rate: f64, max: f32) -> f32 {
    let samples = ms_to_samples(delay_ms, sample_rate);
    if samples.is_finite() {
        samples.clamp(0.0, max)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_samples() {
        assert_eq!(delay_samples(10.0, 48000.0, 47999.0), 480.0);
        assert_eq!(delay_samples(-3.0, 48000.0, 47999.0), 0.0);
        assert_eq!(delay_samples(5000.0, 48000.0, 47999.0), 47999.0);
        assert_eq!(delay_samples(f32::NAN, 48000.0, 47999.0), 0.0);
    }
}
