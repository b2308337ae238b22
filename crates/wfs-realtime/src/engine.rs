//! WFS engine coordinator
//!
//! Owns the channel processors, the published routing and the solo mask, and
//! is pumped once per driver callback: `push_input` for every hardware
//! input, then `pull_output` for every loudspeaker. Pulls never block; the
//! caller zero-pads whatever was not ready (`process_block` does this).
//!
//! The engine also owns a fork-join pool sized by `EngineConfig::pool_workers`
//! for per-block work that fans out across channels or nodes.

use std::sync::Arc;

use wfs_core::{EngineConfig, ProcessingMode, RoutingSnapshot, Sample, WfsError, WfsResult};

use crate::lifecycle::ProcessorState;
use crate::pool::ParallelFor;
use crate::processor::{BinauralProcessor, ChannelProcessor, InputProcessor, OutputProcessor};
use crate::routing::RoutingTable;
use crate::solo::SoloMask;

/// Per-processor load report
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorDiagnostics {
    pub name: String,
    pub state: ProcessorState,
    pub enabled: bool,
    pub cpu_usage_percent: f32,
    pub processing_time_us: f32,
}

enum Channels {
    /// One processor per input; each owns a ring per loudspeaker
    Input(Vec<InputProcessor>),
    /// One processor per loudspeaker; each owns a ring per input
    Output(Vec<OutputProcessor>),
}

pub struct WfsEngine {
    config: Option<EngineConfig>,
    routing: Arc<RoutingTable>,
    solo: Arc<SoloMask>,
    channels: Channels,
    binaural: Option<BinauralProcessor>,
    pool: ParallelFor,
    /// Summing buffer for input-buffer mode pulls
    scratch: Vec<Sample>,
    running: bool,
}

impl WfsEngine {
    pub fn new() -> WfsResult<Self> {
        Ok(Self {
            config: None,
            routing: Arc::new(RoutingTable::new(RoutingSnapshot::new(0, 0))?),
            solo: Arc::new(SoloMask::new(0)),
            channels: Channels::Output(Vec::new()),
            binaural: None,
            pool: ParallelFor::new(0)?,
            scratch: Vec::new(),
            running: false,
        })
    }

    /// Current configuration, if prepared
    #[inline]
    pub fn config(&self) -> Option<&EngineConfig> {
        self.config.as_ref()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Worker threads in the engine's pool, excluding the caller
    #[inline]
    pub fn pool_workers(&self) -> usize {
        self.pool.num_workers()
    }

    /// Run `func(i)` once for every `i` in `0..count` on the engine's pool.
    /// Runs on the caller alone until the engine is prepared with workers.
    pub fn parallel_for<F>(&mut self, count: usize, func: F)
    where
        F: Fn(usize) + Sync,
    {
        self.pool.run(count, func);
    }

    #[inline]
    pub fn routing(&self) -> &RoutingTable {
        &self.routing
    }

    #[inline]
    pub fn solo(&self) -> &SoloMask {
        &self.solo
    }

    fn processors(&self) -> Box<dyn Iterator<Item = &dyn ChannelProcessor> + '_> {
        let channels: Box<dyn Iterator<Item = &dyn ChannelProcessor>> = match &self.channels {
            Channels::Input(list) => Box::new(list.iter().map(|p| p as &dyn ChannelProcessor)),
            Channels::Output(list) => Box::new(list.iter().map(|p| p as &dyn ChannelProcessor)),
        };
        Box::new(
            channels.chain(
                self.binaural
                    .as_ref()
                    .map(|p| p as &dyn ChannelProcessor),
            ),
        )
    }

    fn processors_mut(&mut self) -> Box<dyn Iterator<Item = &mut dyn ChannelProcessor> + '_> {
        let channels: Box<dyn Iterator<Item = &mut dyn ChannelProcessor>> =
            match &mut self.channels {
                Channels::Input(list) => {
                    Box::new(list.iter_mut().map(|p| p as &mut dyn ChannelProcessor))
                }
                Channels::Output(list) => {
                    Box::new(list.iter_mut().map(|p| p as &mut dyn ChannelProcessor))
                }
            };
        Box::new(
            channels.chain(
                self.binaural
                    .as_mut()
                    .map(|p| p as &mut dyn ChannelProcessor),
            ),
        )
    }

    /// Apply `op` to every processor, keeping the first error
    fn for_each_processor(
        &mut self,
        mut op: impl FnMut(&mut dyn ChannelProcessor) -> WfsResult<()>,
    ) -> WfsResult<()> {
        let mut result = Ok(());
        for processor in self.processors_mut() {
            if let Err(e) = op(processor) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    // ============ Lifecycle ============

    /// Size every processor for `config`. A change of channel counts, mode or
    /// block size stops the engine, rebuilds every processor and restarts it;
    /// any audio in flight is discarded.
    pub fn prepare_to_play(&mut self, config: EngineConfig) -> WfsResult<()> {
        if let Err(e) = config.validate() {
            log::warn!("Rejected engine config: {e}");
            return Err(e);
        }
        let was_running = self.running;
        self.stop_processing()?;

        let rebuild = self.config.as_ref().is_none_or(|current| {
            current.num_inputs != config.num_inputs
                || current.num_outputs != config.num_outputs
                || current.mode != config.mode
                || current.binaural != config.binaural
                || current.processing_block_size != config.processing_block_size
        });

        if rebuild {
            self.rebuild(&config)?;
        }

        self.for_each_processor(|p| p.prepare(config.sample_rate, config.max_block_size))?;
        if self.pool.num_workers() != config.pool_workers {
            log::debug!(
                "Resizing engine pool: {} -> {} workers",
                self.pool.num_workers(),
                config.pool_workers
            );
            self.pool = ParallelFor::new(config.pool_workers)?;
        }
        self.scratch = vec![0.0; config.ring_capacity()];
        log::info!(
            "Engine prepared: {} in / {} out @ {} Hz, block {}, {:?}",
            config.num_inputs,
            config.num_outputs,
            config.sample_rate,
            config.max_block_size,
            config.mode
        );
        self.config = Some(config);

        if was_running {
            self.start_processing()?;
        }
        Ok(())
    }

    fn rebuild(&mut self, config: &EngineConfig) -> WfsResult<()> {
        log::info!(
            "Rebuilding processors for {} in / {} out",
            config.num_inputs,
            config.num_outputs
        );
        self.for_each_processor(|p| p.release())?;

        let routing = &self.routing;
        let current = routing.load();
        if current.num_inputs() != config.num_inputs || current.num_outputs() != config.num_outputs
        {
            routing.publish(RoutingSnapshot::new(config.num_inputs, config.num_outputs));
        }

        self.solo = Arc::new(SoloMask::new(config.num_inputs));
        let block = config.processing_block_size;
        self.channels = match config.mode {
            ProcessingMode::InputBuffer => Channels::Input(
                (0..config.num_inputs)
                    .map(|c| InputProcessor::new(c, config.num_outputs, block, Arc::clone(routing)))
                    .collect(),
            ),
            ProcessingMode::OutputBuffer => Channels::Output(
                (0..config.num_outputs)
                    .map(|c| OutputProcessor::new(c, config.num_inputs, block, Arc::clone(routing)))
                    .collect(),
            ),
        };
        self.binaural = config.binaural.then(|| {
            BinauralProcessor::new(
                config.num_inputs,
                block,
                Arc::clone(routing),
                Arc::clone(&self.solo),
            )
        });
        Ok(())
    }

    /// Stop every thread and free every buffer
    pub fn release_resources(&mut self) -> WfsResult<()> {
        self.running = false;
        let result = self.for_each_processor(|p| p.release());
        self.scratch = Vec::new();
        self.pool = ParallelFor::new(0)?;
        self.config = None;
        log::info!("Engine resources released");
        result
    }

    /// Discard all audio in flight. Running processors keep running.
    pub fn reset(&mut self) -> WfsResult<()> {
        self.for_each_processor(|p| p.reset())
    }

    /// Disabled processors keep draining their input but emit silence
    pub fn set_enabled(&mut self, enabled: bool) {
        for processor in self.processors() {
            processor.set_enabled(enabled);
        }
    }

    pub fn start_processing(&mut self) -> WfsResult<()> {
        if self.config.is_none() {
            return Err(WfsError::InvalidState {
                expected: "Prepared",
                actual: "Unprepared",
            });
        }
        self.for_each_processor(|p| p.start())?;
        self.running = true;
        log::info!("Engine started");
        Ok(())
    }

    pub fn stop_processing(&mut self) -> WfsResult<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        let result = self.for_each_processor(|p| p.stop());
        log::info!("Engine stopped");
        result
    }

    /// Render everything queued on the calling thread. Only meaningful while
    /// the processor threads are stopped.
    pub fn process_pending(&mut self) -> usize {
        self.processors_mut().map(|p| p.process_pending()).sum()
    }

    // ============ Routing ============

    /// Publish new routing coefficients. Returns the snapshot version.
    pub fn publish_routing(&self, snapshot: RoutingSnapshot) -> WfsResult<u64> {
        if let Some(config) = &self.config {
            if snapshot.num_inputs() != config.num_inputs
                || snapshot.num_outputs() != config.num_outputs
            {
                let message = format!(
                    "routing is {}x{}, engine is {}x{}",
                    snapshot.num_inputs(),
                    snapshot.num_outputs(),
                    config.num_inputs,
                    config.num_outputs
                );
                log::warn!("Rejected routing snapshot: {message}");
                return Err(WfsError::InvalidParam(message));
            }
        }
        Ok(self.routing.publish(snapshot))
    }

    // ============ Audio path ============

    /// Queue one hardware input block. Out-of-range channels are ignored.
    pub fn push_input(&mut self, channel: usize, data: &[Sample]) {
        match &mut self.channels {
            Channels::Input(list) => {
                if let Some(processor) = list.get_mut(channel) {
                    processor.push_input(data);
                }
            }
            Channels::Output(list) => {
                for processor in list {
                    processor.push_input(channel, data);
                }
            }
        }
        if let Some(binaural) = self.binaural.as_mut() {
            binaural.push_input(channel, data);
        }
    }

    /// Move rendered samples for one loudspeaker into `dest`. Returns the
    /// number written; the caller zero-pads the rest.
    pub fn pull_output(&mut self, channel: usize, dest: &mut [Sample]) -> usize {
        match &mut self.channels {
            Channels::Output(list) => list
                .get_mut(channel)
                .map_or(0, |processor| processor.pull_output(dest)),
            Channels::Input(list) => {
                // Take only what every input has ready so the rings stay aligned
                let ready = list
                    .iter()
                    .map(|processor| processor.available(channel))
                    .min()
                    .unwrap_or(0);
                let n = ready.min(dest.len()).min(self.scratch.len());
                dest[..n].fill(0.0);
                for processor in list {
                    let read = processor.pull_output(channel, &mut self.scratch[..n]);
                    for (d, s) in dest[..read].iter_mut().zip(&self.scratch[..read]) {
                        *d += s;
                    }
                }
                n
            }
        }
    }

    /// Move rendered binaural samples for one ear (0 = left, 1 = right)
    pub fn pull_binaural(&mut self, ear: usize, dest: &mut [Sample]) -> usize {
        self.binaural
            .as_mut()
            .map_or(0, |processor| processor.pull_output(ear, dest))
    }

    /// Push every input, pull every output and zero-pad any shortfall.
    /// Extra channels on either side are ignored or zeroed.
    pub fn process_block(&mut self, inputs: &[&[Sample]], outputs: &mut [&mut [Sample]]) {
        for (channel, data) in inputs.iter().enumerate() {
            self.push_input(channel, data);
        }
        for (channel, dest) in outputs.iter_mut().enumerate() {
            let n = self.pull_output(channel, dest);
            dest[n..].fill(0.0);
        }
    }

    // ============ Diagnostics ============

    pub fn diagnostics(&self) -> Vec<ProcessorDiagnostics> {
        self.processors()
            .map(|p| ProcessorDiagnostics {
                name: p.name().to_string(),
                state: p.state(),
                enabled: p.is_enabled(),
                cpu_usage_percent: p.cpu_usage_percent(),
                processing_time_us: p.processing_time_us(),
            })
            .collect()
    }
}

impl Drop for WfsEngine {
    fn drop(&mut self) {
        let _ = self.stop_processing();
    }
}
