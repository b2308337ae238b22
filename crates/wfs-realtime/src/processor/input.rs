//! Per-input processor
//!
//! One thread per input channel. Each block of input is written into a
//! one-second delay line, then read back once per loudspeaker at that
//! route's delay with linear interpolation, filtered for air absorption,
//! scaled and queued on the loudspeaker's ring. The driver sums the rings of
//! all input processors for each loudspeaker.

use std::sync::Arc;
use std::time::Instant;

use wfs_core::{RING_CAPACITY_BLOCKS, Sample, WfsError, WfsResult};
use wfs_dsp::{AirAbsorptionFilter, DelayLine, MonoProcessor, Processor};

use super::{ProcessorParts, delay_samples};
use crate::lifecycle::{Worker, WorkerControl, WorkerHost};
use crate::ring::{SampleReader, SampleWriter, sample_ring};
use crate::routing::RoutingTable;

pub struct InputProcessor {
    channel: usize,
    num_outputs: usize,
    block_size: usize,
    routing: Arc<RoutingTable>,
    input_tx: Option<SampleWriter>,
    output_rx: Vec<SampleReader>,
    host: WorkerHost<InputWorker>,
}

impl InputProcessor {
    pub fn new(
        channel: usize,
        num_outputs: usize,
        block_size: usize,
        routing: Arc<RoutingTable>,
    ) -> Self {
        Self {
            channel,
            num_outputs,
            block_size,
            routing,
            input_tx: None,
            output_rx: Vec::new(),
            host: WorkerHost::new(format!("wfs-in-{channel}")),
        }
    }

    #[inline]
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Queue driver input. Returns the number of samples accepted.
    pub fn push_input(&mut self, data: &[Sample]) -> usize {
        self.input_tx.as_mut().map_or(0, |tx| tx.write(data))
    }

    /// Samples ready for one loudspeaker
    #[inline]
    pub fn available(&self, output: usize) -> usize {
        self.output_rx.get(output).map_or(0, SampleReader::available)
    }

    /// Move rendered samples for one loudspeaker into `dest`. Returns the
    /// number written; out-of-range outputs read nothing.
    pub fn pull_output(&mut self, output: usize, dest: &mut [Sample]) -> usize {
        self.output_rx
            .get_mut(output)
            .map_or(0, |rx| rx.read(dest))
    }
}

impl ProcessorParts for InputProcessor {
    type Worker = InputWorker;

    fn host(&self) -> &WorkerHost<InputWorker> {
        &self.host
    }

    fn host_mut(&mut self) -> &mut WorkerHost<InputWorker> {
        &mut self.host
    }

    fn build(&mut self, sample_rate: f64, max_block_size: usize) -> WfsResult<InputWorker> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(WfsError::InvalidSampleRate(sample_rate));
        }
        let capacity = RING_CAPACITY_BLOCKS * max_block_size;
        if self.block_size == 0 || self.block_size > capacity {
            return Err(WfsError::InvalidConfig(format!(
                "block size {} does not fit ring capacity {capacity}",
                self.block_size
            )));
        }

        let (input_tx, input) = sample_ring(capacity);
        let (outputs, output_rx): (Vec<_>, Vec<_>) =
            (0..self.num_outputs).map(|_| sample_ring(capacity)).unzip();
        self.input_tx = Some(input_tx);
        self.output_rx = output_rx;

        Ok(InputWorker {
            channel: self.channel,
            sample_rate,
            block_size: self.block_size,
            routing: Arc::clone(&self.routing),
            input,
            outputs,
            delay: DelayLine::for_sample_rate(sample_rate),
            air: (0..self.num_outputs)
                .map(|_| AirAbsorptionFilter::new(sample_rate))
                .collect(),
            block: vec![0.0; self.block_size],
            scratch: vec![0.0; self.block_size],
        })
    }

    fn drain_rings(&mut self) {
        for rx in &mut self.output_rx {
            rx.clear();
        }
    }

    fn release_rings(&mut self) {
        self.input_tx = None;
        self.output_rx.clear();
    }
}

/// Thread half of an [`InputProcessor`]
pub struct InputWorker {
    channel: usize,
    sample_rate: f64,
    block_size: usize,
    routing: Arc<RoutingTable>,
    input: SampleReader,
    outputs: Vec<SampleWriter>,
    delay: DelayLine,
    /// One air absorption filter per loudspeaker
    air: Vec<AirAbsorptionFilter>,
    block: Vec<Sample>,
    scratch: Vec<Sample>,
}

impl Worker for InputWorker {
    fn process_available(&mut self, control: &WorkerControl) -> usize {
        let mut rendered = 0;

        while self.input.available() >= self.block_size {
            let started = Instant::now();
            self.input.read(&mut self.block);
            let start = self.delay.write_block(&self.block);

            let enabled = control.is_enabled();
            let routing = self.routing.load();
            // Reads never reach the part of this block not yet due
            let max_delay = self.delay.len().saturating_sub(self.block_size) as f32;

            for (output, (writer, air)) in self.outputs.iter_mut().zip(&mut self.air).enumerate() {
                let route = routing.direct(self.channel, output);
                if !enabled || !route.is_active() {
                    self.scratch.fill(0.0);
                } else {
                    let delay = delay_samples(route.delay_ms, self.sample_rate, max_delay);
                    air.set_gain_db(route.hf_atten_db);
                    for (i, out) in self.scratch.iter_mut().enumerate() {
                        *out = air.process_sample(self.delay.read_behind(start + i, delay))
                            * route.level;
                    }
                }
                writer.write(&self.scratch);
            }

            control
                .load()
                .record(started.elapsed(), self.block_size as f64 / self.sample_rate);
            rendered += 1;
        }

        rendered
    }

    fn reset(&mut self) {
        self.input.clear();
        self.delay.clear();
        for filter in &mut self.air {
            filter.reset();
        }
    }
}
