//! Error types for the WFS renderer

use thiserror::Error;

/// Core error type
///
/// Only control-rate operations return errors. The audio path never does.
#[derive(Error, Debug)]
pub enum WfsError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    #[error("Channel {index} out of range (have {count})")]
    ChannelOutOfRange { index: usize, count: usize },

    #[error("Processor is in state {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Failed to spawn thread '{name}': {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Thread '{name}' did not exit within {timeout_ms} ms")]
    ShutdownTimeout { name: String, timeout_ms: u64 },

    #[error("Thread '{0}' panicked")]
    ThreadPanicked(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias
pub type WfsResult<T> = Result<T, WfsError>;
