//! # WFS Real-Time Engine
//!
//! Threads, queues and coordination for rendering wave field synthesis in
//! real time:
//! - SPSC sample rings between the driver callback and processor threads
//! - Per-input, per-output and binaural channel processors
//! - Routing snapshots published by atomic pointer swap
//! - Fork-join pool for per-node work such as reverb
//!
//! Nothing on the audio path locks, allocates or returns an error.

pub mod engine;
pub mod gc;
pub mod lifecycle;
pub mod pool;
pub mod processor;
pub mod reverb_bank;
pub mod ring;
pub mod routing;
pub mod solo;
pub mod stats;

pub use engine::{ProcessorDiagnostics, WfsEngine};
pub use gc::gc_handle;
pub use lifecycle::{ProcessorState, Worker, WorkerControl, WorkerHost};
pub use pool::ParallelFor;
pub use processor::{
    BinauralProcessor, ChannelProcessor, InputProcessor, OutputProcessor, ProcessorParts,
};
pub use reverb_bank::{ReverbKind, ReverbNodeBank};
pub use ring::{SampleReader, SampleWriter, sample_ring};
pub use routing::RoutingTable;
pub use solo::SoloMask;
pub use stats::LoadMeter;
