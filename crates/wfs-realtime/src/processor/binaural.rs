//! Binaural processor
//!
//! A single thread renders every input to a stereo headphone pair. Each
//! input's block goes into its own delay line and is read back twice, once
//! per ear, at a whole-sample delay, then filtered and scaled per ear.
//!
//! While any input is soloed, only soloed inputs are rendered. Inputs that
//! are not heard are still drained so their rings stay in step with the
//! driver.

use std::sync::Arc;
use std::time::Instant;

use wfs_core::{RING_CAPACITY_BLOCKS, Sample, WfsError, WfsResult, binaural_block_size};
use wfs_dsp::{AirAbsorptionFilter, DelayLine, MonoProcessor, Processor};

use super::{ProcessorParts, delay_samples};
use crate::lifecycle::{Worker, WorkerControl, WorkerHost};
use crate::ring::{SampleReader, SampleWriter, sample_ring};
use crate::routing::RoutingTable;
use crate::solo::SoloMask;

/// Left and right
pub const NUM_EARS: usize = 2;

pub struct BinauralProcessor {
    num_inputs: usize,
    processing_block_size: usize,
    routing: Arc<RoutingTable>,
    solo: Arc<SoloMask>,
    input_tx: Vec<SampleWriter>,
    output_rx: Vec<SampleReader>,
    host: WorkerHost<BinauralWorker>,
}

impl BinauralProcessor {
    pub fn new(
        num_inputs: usize,
        processing_block_size: usize,
        routing: Arc<RoutingTable>,
        solo: Arc<SoloMask>,
    ) -> Self {
        Self {
            num_inputs,
            processing_block_size,
            routing,
            solo,
            input_tx: Vec::new(),
            output_rx: Vec::new(),
            host: WorkerHost::new("wfs-binaural"),
        }
    }

    /// Queue driver input for one source. Out-of-range inputs are ignored.
    pub fn push_input(&mut self, input: usize, data: &[Sample]) -> usize {
        self.input_tx.get_mut(input).map_or(0, |tx| tx.write(data))
    }

    #[inline]
    pub fn available(&self, ear: usize) -> usize {
        self.output_rx.get(ear).map_or(0, SampleReader::available)
    }

    /// Move rendered samples for one ear (0 = left, 1 = right) into `dest`
    pub fn pull_output(&mut self, ear: usize, dest: &mut [Sample]) -> usize {
        self.output_rx.get_mut(ear).map_or(0, |rx| rx.read(dest))
    }
}

impl ProcessorParts for BinauralProcessor {
    type Worker = BinauralWorker;

    fn host(&self) -> &WorkerHost<BinauralWorker> {
        &self.host
    }

    fn host_mut(&mut self) -> &mut WorkerHost<BinauralWorker> {
        &mut self.host
    }

    fn build(&mut self, sample_rate: f64, max_block_size: usize) -> WfsResult<BinauralWorker> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(WfsError::InvalidSampleRate(sample_rate));
        }
        let capacity = RING_CAPACITY_BLOCKS * max_block_size;
        let block_size = binaural_block_size(max_block_size, self.processing_block_size);
        if block_size == 0 || block_size > capacity {
            return Err(WfsError::InvalidConfig(format!(
                "binaural block {block_size} does not fit ring capacity {capacity}"
            )));
        }

        let (input_tx, inputs): (Vec<_>, Vec<_>) =
            (0..self.num_inputs).map(|_| sample_ring(capacity)).unzip();
        let (outputs, output_rx): (Vec<_>, Vec<_>) =
            (0..NUM_EARS).map(|_| sample_ring(capacity)).unzip();
        self.input_tx = input_tx;
        self.output_rx = output_rx;

        Ok(BinauralWorker {
            sample_rate,
            block_size,
            routing: Arc::clone(&self.routing),
            solo: Arc::clone(&self.solo),
            inputs,
            outputs,
            lines: (0..self.num_inputs)
                .map(|_| DelayLine::for_sample_rate(sample_rate))
                .collect(),
            air: (0..self.num_inputs * NUM_EARS)
                .map(|_| AirAbsorptionFilter::new(sample_rate))
                .collect(),
            block: vec![0.0; block_size],
            mix: vec![0.0; NUM_EARS * block_size],
        })
    }

    fn drain_rings(&mut self) {
        for rx in &mut self.output_rx {
            rx.clear();
        }
    }

    fn release_rings(&mut self) {
        self.input_tx.clear();
        self.output_rx.clear();
    }
}

/// Thread half of a [`BinauralProcessor`]
pub struct BinauralWorker {
    sample_rate: f64,
    block_size: usize,
    routing: Arc<RoutingTable>,
    solo: Arc<SoloMask>,
    inputs: Vec<SampleReader>,
    outputs: Vec<SampleWriter>,
    lines: Vec<DelayLine>,
    /// `input * NUM_EARS + ear`
    air: Vec<AirAbsorptionFilter>,
    block: Vec<Sample>,
    /// `ear * block_size + n`
    mix: Vec<Sample>,
}

impl BinauralWorker {
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    #[inline]
    fn block_ready(&self) -> bool {
        !self.inputs.is_empty()
            && self
                .inputs
                .iter()
                .all(|rx| rx.available() >= self.block_size)
    }
}

impl Worker for BinauralWorker {
    fn process_available(&mut self, control: &WorkerControl) -> usize {
        let mut rendered = 0;

        while self.block_ready() {
            let started = Instant::now();
            let block_size = self.block_size;
            let enabled = control.is_enabled();
            let routing = self.routing.load();
            self.mix.fill(0.0);

            for (input, rx) in self.inputs.iter_mut().enumerate() {
                // Unheard inputs still advance their line so it never holds stale audio
                rx.read(&mut self.block);
                let line = &mut self.lines[input];
                let start = line.write_block(&self.block);
                if !enabled || !self.solo.is_audible(input) {
                    continue;
                }

                let max_delay = line.len().saturating_sub(block_size) as f32;
                let route = routing.binaural(input);

                for ear in 0..NUM_EARS {
                    let tap = route.ear(ear);
                    if !tap.is_active() {
                        continue;
                    }
                    let delay =
                        delay_samples(tap.delay_ms, self.sample_rate, max_delay).round() as usize;
                    let air = &mut self.air[input * NUM_EARS + ear];
                    air.set_gain_db(tap.hf_atten_db);

                    let mix = &mut self.mix[ear * block_size..(ear + 1) * block_size];
                    for (i, out) in mix.iter_mut().enumerate() {
                        *out += air.process_sample(line.read_behind_integer(start + i, delay))
                            * tap.level;
                    }
                }
            }

            for (ear, writer) in self.outputs.iter_mut().enumerate() {
                writer.write(&self.mix[ear * block_size..(ear + 1) * block_size]);
            }
            control
                .load()
                .record(started.elapsed(), block_size as f64 / self.sample_rate);
            rendered += 1;
        }

        rendered
    }

    fn reset(&mut self) {
        for rx in &mut self.inputs {
            rx.clear();
        }
        for line in &mut self.lines {
            line.clear();
        }
        for filter in &mut self.air {
            filter.reset();
        }
    }
}
