//! Engine configuration
//!
//! Loaded from JSON or built in code. Everything the real-time crate sizes at
//! prepare time is derived from here.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    DELAY_LINE_SECONDS, MAX_BINAURAL_BLOCK_SIZE, PROCESSING_BLOCK_SIZE, RING_CAPACITY_BLOCKS,
    WfsError, WfsResult,
};

/// Which thread owns the delay lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProcessingMode {
    /// One thread per input channel, delays read back from behind the write cursor
    InputBuffer,
    /// One thread per output channel, contributions deposited ahead of the read cursor
    #[default]
    OutputBuffer,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate in Hz
    pub sample_rate: f64,
    /// Largest block the audio driver will deliver
    pub max_block_size: usize,
    /// Number of input channels (sources)
    pub num_inputs: usize,
    /// Number of output channels (loudspeakers)
    pub num_outputs: usize,
    /// Samples consumed per processor iteration
    pub processing_block_size: usize,
    /// Delay-line ownership variant
    pub mode: ProcessingMode,
    /// Run the stereo binaural processor
    pub binaural: bool,
    /// Worker threads in the fork-join pool (the caller participates as well)
    pub pool_workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            max_block_size: 512,
            num_inputs: 2,
            num_outputs: 2,
            processing_block_size: PROCESSING_BLOCK_SIZE,
            mode: ProcessingMode::default(),
            binaural: true,
            pool_workers: Self::default_pool_workers(),
        }
    }
}

impl EngineConfig {
    /// Create a config for the given topology, defaults elsewhere
    pub fn new(sample_rate: f64, max_block_size: usize, num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            sample_rate,
            max_block_size,
            num_inputs,
            num_outputs,
            ..Default::default()
        }
    }

    /// Pool size for this machine: leave one core for the audio callback
    pub fn default_pool_workers() -> usize {
        num_cpus::get().saturating_sub(1).min(8)
    }

    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> WfsResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> WfsResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        log::info!(
            "Loaded engine config from {}: {} in / {} out @ {} Hz",
            path.display(),
            config.num_inputs,
            config.num_outputs,
            config.sample_rate
        );
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json_string(&self) -> WfsResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject configurations the engine cannot be prepared with
    pub fn validate(&self) -> WfsResult<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(WfsError::InvalidSampleRate(self.sample_rate));
        }
        if self.max_block_size == 0 {
            return Err(WfsError::InvalidConfig("max_block_size must be > 0".into()));
        }
        if self.processing_block_size == 0 {
            return Err(WfsError::InvalidConfig(
                "processing_block_size must be > 0".into(),
            ));
        }
        if self.num_inputs == 0 || self.num_outputs == 0 {
            return Err(WfsError::InvalidConfig(format!(
                "need at least one input and one output (got {} / {})",
                self.num_inputs, self.num_outputs
            )));
        }
        if self.processing_block_size > self.ring_capacity() {
            return Err(WfsError::InvalidConfig(format!(
                "processing block {} exceeds ring capacity {}",
                self.processing_block_size,
                self.ring_capacity()
            )));
        }
        Ok(())
    }

    /// Capacity of every SPSC sample ring
    #[inline]
    pub fn ring_capacity(&self) -> usize {
        RING_CAPACITY_BLOCKS * self.max_block_size
    }

    /// Length of every delay line in samples
    #[inline]
    pub fn delay_line_len(&self) -> usize {
        delay_line_len(self.sample_rate)
    }
}

/// Block size the binaural processor drains per iteration: the driver block,
/// held between the processing block and 512
#[inline]
pub fn binaural_block_size(max_block_size: usize, processing_block_size: usize) -> usize {
    max_block_size.clamp(
        processing_block_size,
        MAX_BINAURAL_BLOCK_SIZE.max(processing_block_size),
    )
}

/// Delay line length for a sample rate (one second, at least one sample)
#[inline]
pub fn delay_line_len(sample_rate: f64) -> usize {
    ((sample_rate * DELAY_LINE_SECONDS) as usize).max(1)
}
