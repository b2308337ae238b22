//! Per-output processor
//!
//! One thread per loudspeaker. Every input's fresh sample is filtered,
//! scaled and deposited ahead of the read cursor at `cursor + delay`, so
//! sources with different delays sum onto one output timeline. Each sample
//! of output is then the slot under the cursor, consumed and zeroed.
//!
//! The floor reflection has its own delay line. Its delay is the direct delay
//! plus the route's extra reflection delay plus the input's diffusion jitter,
//! and it runs through an optional low cut, an optional high shelf and its
//! own air absorption filter.

use std::sync::Arc;
use std::time::Instant;

use wfs_core::{RING_CAPACITY_BLOCKS, Sample, WfsError, WfsResult};
use wfs_dsp::{
    AirAbsorptionFilter, DelayLine, DiffusionJitter, FloorFilter, MonoProcessor, Processor,
};

use super::{ProcessorParts, delay_samples};
use crate::lifecycle::{Worker, WorkerControl, WorkerHost};
use crate::ring::{SampleReader, SampleWriter, sample_ring};
use crate::routing::RoutingTable;

pub struct OutputProcessor {
    channel: usize,
    num_inputs: usize,
    block_size: usize,
    routing: Arc<RoutingTable>,
    input_tx: Vec<SampleWriter>,
    output_rx: Option<SampleReader>,
    host: WorkerHost<OutputWorker>,
}

impl OutputProcessor {
    pub fn new(
        channel: usize,
        num_inputs: usize,
        block_size: usize,
        routing: Arc<RoutingTable>,
    ) -> Self {
        Self {
            channel,
            num_inputs,
            block_size,
            routing,
            input_tx: Vec::new(),
            output_rx: None,
            host: WorkerHost::new(format!("wfs-out-{channel}")),
        }
    }

    #[inline]
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Queue driver input for one source. Out-of-range inputs are ignored.
    pub fn push_input(&mut self, input: usize, data: &[Sample]) -> usize {
        self.input_tx.get_mut(input).map_or(0, |tx| tx.write(data))
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.output_rx.as_ref().map_or(0, SampleReader::available)
    }

    /// Move rendered samples into `dest`. Returns the number written.
    pub fn pull_output(&mut self, dest: &mut [Sample]) -> usize {
        self.output_rx.as_mut().map_or(0, |rx| rx.read(dest))
    }
}

impl ProcessorParts for OutputProcessor {
    type Worker = OutputWorker;

    fn host(&self) -> &WorkerHost<OutputWorker> {
        &self.host
    }

    fn host_mut(&mut self) -> &mut WorkerHost<OutputWorker> {
        &mut self.host
    }

    fn build(&mut self, sample_rate: f64, max_block_size: usize) -> WfsResult<OutputWorker> {
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

        let (input_tx, inputs): (Vec<_>, Vec<_>) =
            (0..self.num_inputs).map(|_| sample_ring(capacity)).unzip();
        let (output, output_rx) = sample_ring(capacity);
        self.input_tx = input_tx;
        self.output_rx = Some(output_rx);

        let n = self.num_inputs;
        Ok(OutputWorker {
            channel: self.channel,
            sample_rate,
            block_size: self.block_size,
            routing: Arc::clone(&self.routing),
            inputs,
            output,
            direct_line: DelayLine::for_sample_rate(sample_rate),
            reflection_line: DelayLine::for_sample_rate(sample_rate),
            direct_air: (0..n).map(|_| AirAbsorptionFilter::new(sample_rate)).collect(),
            fr_low_cut: (0..n).map(|_| FloorFilter::low_cut(sample_rate)).collect(),
            fr_shelf: (0..n).map(|_| FloorFilter::high_shelf(sample_rate)).collect(),
            fr_air: (0..n).map(|_| AirAbsorptionFilter::new(sample_rate)).collect(),
            jitter: DiffusionJitter::new(n, 0x5746_5300 ^ self.channel as u64),
            taps: vec![Tap::default(); n],
            input_blocks: vec![0.0; n * self.block_size],
            out_block: vec![0.0; self.block_size],
            was_enabled: true,
        })
    }

    fn drain_rings(&mut self) {
        if let Some(rx) = self.output_rx.as_mut() {
            rx.clear();
        }
    }

    fn release_rings(&mut self) {
        self.input_tx.clear();
        self.output_rx = None;
    }
}

/// One input's contribution for the current block
#[derive(Debug, Clone, Copy, Default)]
struct Tap {
    direct_delay: f32,
    direct_level: f32,
    fr_delay: f32,
    fr_level: f32,
    low_cut: bool,
    high_shelf: bool,
}

impl Tap {
    #[inline]
    fn is_silent(&self) -> bool {
        self.direct_level == 0.0 && self.fr_level == 0.0
    }
}

/// Thread half of an [`OutputProcessor`]
pub struct OutputWorker {
    channel: usize,
    sample_rate: f64,
    block_size: usize,
    routing: Arc<RoutingTable>,
    inputs: Vec<SampleReader>,
    output: SampleWriter,
    direct_line: DelayLine,
    reflection_line: DelayLine,
    direct_air: Vec<AirAbsorptionFilter>,
    fr_low_cut: Vec<FloorFilter>,
    fr_shelf: Vec<FloorFilter>,
    fr_air: Vec<AirAbsorptionFilter>,
    jitter: DiffusionJitter,
    taps: Vec<Tap>,
    /// Current block of every input, `input * block_size + n`
    input_blocks: Vec<Sample>,
    out_block: Vec<Sample>,
    was_enabled: bool,
}

impl OutputWorker {
    #[inline]
    fn block_ready(&self) -> bool {
        !self.inputs.is_empty()
            && self
                .inputs
                .iter()
                .all(|rx| rx.available() >= self.block_size)
    }

    /// Load routing once and bring every filter and tap up to date
    fn update_taps(&mut self) {
        let routing = self.routing.load();
        self.jitter
            .advance_block(|input| routing.floor_reflection_settings(input).diffusion_percent);

        let max_delay = self.direct_line.max_delay();
        for (input, tap) in self.taps.iter_mut().enumerate() {
            let direct = routing.direct(input, self.channel);
            let reflection = routing.floor_reflection(input, self.channel);
            let settings = routing.floor_reflection_settings(input);

            if direct.is_active() {
                self.direct_air[input].set_gain_db(direct.hf_atten_db);
            }
            if reflection.is_active() {
                if settings.low_cut_enabled {
                    self.fr_low_cut[input].set_frequency(settings.low_cut_freq);
                }
                if settings.high_shelf_enabled {
                    self.fr_shelf[input].set_shelf(
                        settings.high_shelf_freq,
                        settings.high_shelf_gain_db,
                        settings.high_shelf_slope,
                    );
                }
                self.fr_air[input].set_gain_db(reflection.hf_atten_db);
            }

            let fr_delay_ms = direct.delay_ms + reflection.delay_ms + self.jitter.current_ms(input);
            *tap = Tap {
                direct_delay: delay_samples(direct.delay_ms, self.sample_rate, max_delay),
                direct_level: direct.level,
                fr_delay: delay_samples(fr_delay_ms, self.sample_rate, max_delay),
                fr_level: reflection.level,
                low_cut: settings.low_cut_enabled,
                high_shelf: settings.high_shelf_enabled,
            };
        }
    }

    fn render_block(&mut self) {
        let block_size = self.block_size;
        for n in 0..block_size {
            for (input, tap) in self.taps.iter().enumerate() {
                if tap.is_silent() {
                    continue;
                }
                let x = self.input_blocks[input * block_size + n];

                if tap.direct_level != 0.0 {
                    let y = self.direct_air[input].process_sample(x) * tap.direct_level;
                    self.direct_line.accumulate_ahead(tap.direct_delay, y);
                }

                if tap.fr_level != 0.0 {
                    let mut y = x;
                    if tap.low_cut {
                        y = self.fr_low_cut[input].process_sample(y);
                    }
                    if tap.high_shelf {
                        y = self.fr_shelf[input].process_sample(y);
                    }
                    y = self.fr_air[input].process_sample(y) * tap.fr_level;
                    self.reflection_line.accumulate_ahead(tap.fr_delay, y);
                }
            }

            self.out_block[n] = self.direct_line.take_current() + self.reflection_line.take_current();
        }
    }

    fn clear_lines(&mut self) {
        self.direct_line.clear();
        self.reflection_line.clear();
    }
}

impl Worker for OutputWorker {
    fn process_available(&mut self, control: &WorkerControl) -> usize {
        let mut rendered = 0;

        while self.block_ready() {
            let started = Instant::now();
            let block_size = self.block_size;
            for (input, rx) in self.inputs.iter_mut().enumerate() {
                rx.read(&mut self.input_blocks[input * block_size..(input + 1) * block_size]);
            }

            if control.is_enabled() {
                self.was_enabled = true;
                self.update_taps();
                self.render_block();
            } else {
                // Drop what was in flight so re-enabling starts clean
                if self.was_enabled {
                    self.clear_lines();
                    self.was_enabled = false;
                }
                self.out_block.fill(0.0);
            }

            self.output.write(&self.out_block);
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
        self.clear_lines();
        for filter in self.direct_air.iter_mut().chain(self.fr_air.iter_mut()) {
            filter.reset();
        }
        for filter in self.fr_low_cut.iter_mut().chain(self.fr_shelf.iter_mut()) {
            filter.reset();
        }
        self.jitter.reset();
        self.taps.fill(Tap::default());
        self.was_enabled = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::ChannelProcessor;
    use wfs_core::{FloorReflectionSettings, Route, RoutingSnapshot};

    const SR: f64 = 48000.0;

    fn processor(snapshot: RoutingSnapshot) -> OutputProcessor {
        let inputs = snapshot.num_inputs();
        let routing = Arc::new(RoutingTable::new(snapshot).unwrap());
        let mut processor = OutputProcessor::new(0, inputs, 64, routing);
        processor.prepare(SR, 256).unwrap();
        processor
    }

    fn render(processor: &mut OutputProcessor, inputs: &[Vec<Sample>]) -> Vec<Sample> {
        let mut out = Vec::new();
        let mut block = [0.0; 256];
        let len = inputs[0].len();
        for start in (0..len).step_by(256) {
            let end = (start + 256).min(len);
            for (input, data) in inputs.iter().enumerate() {
                processor.push_input(input, &data[start..end]);
            }
            processor.process_pending();
            let n = processor.pull_output(&mut block);
            out.extend_from_slice(&block[..n]);
        }
        out
    }

    fn impulse(len: usize) -> Vec<Sample> {
        let mut signal = vec![0.0; len];
        signal[0] = 1.0;
        signal
    }

    #[test]
    fn test_impulse_lands_at_route_delay() {
        let mut snapshot = RoutingSnapshot::new(1, 1);
        snapshot.set_direct(0, 0, Route::new(10.0, 1.0, 0.0)).unwrap();
        let mut processor = processor(snapshot);

        let out = render(&mut processor, &[impulse(1024)]);
        assert_eq!(out.len(), 1024);
        assert!((out[480] - 1.0).abs() < 1e-4);
        for (n, s) in out.iter().enumerate() {
            if n != 480 {
                assert!(s.abs() < 1e-4, "sample {n} = {s}");
            }
        }
    }

    #[test]
    fn test_fractional_delay_splits_between_neighbours() {
        let mut snapshot = RoutingSnapshot::new(1, 1);
        // 100.25 samples
        snapshot
            .set_direct(0, 0, Route::new(100.25 / 48.0, 1.0, 0.0))
            .unwrap();
        let mut processor = processor(snapshot);

        let out = render(&mut processor, &[impulse(256)]);
        assert!((out[100] - 0.75).abs() < 1e-3);
        assert!((out[101] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_sources_sum_on_one_timeline() {
        let mut snapshot = RoutingSnapshot::new(2, 1);
        snapshot.set_direct(0, 0, Route::new(1.0, 0.5, 0.0)).unwrap();
        snapshot.set_direct(1, 0, Route::new(2.0, 0.25, 0.0)).unwrap();
        let mut processor = processor(snapshot);

        let out = render(&mut processor, &[impulse(512), impulse(512)]);
        assert!((out[48] - 0.5).abs() < 1e-4);
        assert!((out[96] - 0.25).abs() < 1e-4);
        let total: f32 = out.iter().sum();
        assert!((total - 0.75).abs() < 1e-3);
    }

    #[test]
    fn test_floor_reflection_adds_late_arrival() {
        let mut snapshot = RoutingSnapshot::new(1, 1);
        snapshot.set_direct(0, 0, Route::new(1.0, 1.0, 0.0)).unwrap();
        snapshot
            .set_floor_reflection(0, 0, Route::new(2.0, 0.5, 0.0))
            .unwrap();
        let mut processor = processor(snapshot);

        let out = render(&mut processor, &[impulse(512)]);
        assert!((out[48] - 1.0).abs() < 1e-4);
        // Direct 1 ms plus extra 2 ms
        assert!((out[144] - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_diffusion_moves_reflection_within_range() {
        let mut snapshot = RoutingSnapshot::new(1, 1);
        snapshot
            .set_floor_reflection(0, 0, Route::new(10.0, 1.0, 0.0))
            .unwrap();
        snapshot
            .set_floor_reflection_settings(
                0,
                FloorReflectionSettings {
                    diffusion_percent: 100.0,
                    ..Default::default()
                },
            )
            .unwrap();
        let mut processor = processor(snapshot);

        // Jitter is at most 5 ms = 240 samples around 480
        let out = render(&mut processor, &[vec![1.0; 8192]]);
        let onset = out.iter().position(|s| s.abs() > 1e-3).unwrap();
        assert!((240..=720).contains(&onset), "onset {onset}");
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_missing_input_stalls_output() {
        let mut snapshot = RoutingSnapshot::new(2, 1);
        snapshot.set_direct(0, 0, Route::new(0.0, 1.0, 0.0)).unwrap();
        let mut processor = processor(snapshot);

        processor.push_input(0, &[1.0; 128]);
        assert_eq!(processor.process_pending(), 0);
        processor.push_input(1, &[0.0; 128]);
        assert_eq!(processor.process_pending(), 2);
        assert_eq!(processor.available(), 128);
    }

    #[test]
    fn test_disable_then_enable_starts_clean() {
        let mut snapshot = RoutingSnapshot::new(1, 1);
        snapshot.set_direct(0, 0, Route::new(3.0, 1.0, 0.0)).unwrap();
        let mut processor = processor(snapshot);

        // Impulse is in flight when processing is disabled
        render(&mut processor, &[impulse(64)]);
        processor.set_enabled(false);
        let muted = render(&mut processor, &[vec![0.0; 256]]);
        assert!(muted.iter().all(|&s| s == 0.0));

        processor.set_enabled(true);
        let out = render(&mut processor, &[vec![0.0; 512]]);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_out_of_range_input_ignored() {
        let mut processor = processor(RoutingSnapshot::new(1, 1));
        assert_eq!(processor.push_input(4, &[1.0; 16]), 0);
    }
}
