//! Feedback delay network
//!
//! Eight delay lines with coprime lengths, a Householder feedback matrix
//! (`H = I - 2/N · 11ᵀ`, O(N) per sample) and one-pole damping in each loop.
//! Loop gains are set per line so every line decays by 60 dB in `rt60_s`.

use wfs_core::Sample;

use super::{ReverbAlgorithm, ReverbParameters, decay_gain};
use crate::delay_line::DelayLine;

const N: usize = 8;

/// Loop lengths at 48 kHz, size 1.0
const BASE_LENGTHS: [usize; N] = [1183, 1399, 1647, 1931, 2161, 2437, 2729, 2963];

/// Largest `size` the lines are allocated for
const MAX_SIZE: f32 = 4.0;

pub struct FdnReverb {
    lines: Vec<DelayLine>,
    lengths: [usize; N],
    gains: [f32; N],
    damping_state: [f32; N],
    params: ReverbParameters,
    sample_rate: f64,
}

impl Default for FdnReverb {
    fn default() -> Self {
        Self::new()
    }
}

impl FdnReverb {
    pub fn new() -> Self {
        let mut reverb = Self {
            lines: Vec::new(),
            lengths: BASE_LENGTHS,
            gains: [0.0; N],
            damping_state: [0.0; N],
            params: ReverbParameters::default(),
            sample_rate: 48000.0,
        };
        reverb.prepare(48000.0, 512);
        reverb
    }

    /// Current loop lengths in samples
    pub fn lengths(&self) -> &[usize; N] {
        &self.lengths
    }

    fn update_loops(&mut self) {
        let scale = self.params.size as f64 * self.sample_rate / 48000.0;
        for (i, base) in BASE_LENGTHS.iter().enumerate() {
            let max = self.lines.get(i).map_or(1, |line| line.len() - 1);
            self.lengths[i] = ((*base as f64 * scale) as usize).clamp(1, max.max(1));
            self.gains[i] = decay_gain(self.lengths[i], self.params.rt60_s, self.sample_rate);
        }
    }
}

impl ReverbAlgorithm for FdnReverb {
    fn prepare(&mut self, sample_rate: f64, _max_block_size: usize) {
        self.sample_rate = sample_rate;
        let scale = MAX_SIZE as f64 * sample_rate / 48000.0;
        self.lines = BASE_LENGTHS
            .iter()
            .map(|base| DelayLine::new((*base as f64 * scale) as usize + 2))
            .collect();
        self.damping_state = [0.0; N];
        self.update_loops();
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.clear();
        }
        self.damping_state = [0.0; N];
    }

    fn process_block(&mut self, input: &[Sample], output: &mut [Sample]) {
        let damping = self.params.damping;
        let wet = self.params.wet / (N as f32).sqrt();
        let input_gain = 1.0 / (N as f32).sqrt();
        let mut reads = [0.0f32; N];

        for (x, y) in input.iter().zip(output.iter_mut()) {
            let mut out = 0.0;
            let mut sum = 0.0;
            for i in 0..N {
                let line = &self.lines[i];
                let read = line.read_behind_integer(line.write_pos(), self.lengths[i]);
                // Alternate output polarity to decorrelate the taps
                out += if i % 2 == 0 { read } else { -read };

                let state = &mut self.damping_state[i];
                *state = (1.0 - damping) * read + damping * *state;
                reads[i] = *state;
                sum += *state;
            }

            let householder = sum * (2.0 / N as f32);
            for i in 0..N {
                let feedback = self.gains[i] * (reads[i] - householder);
                self.lines[i].push(x * input_gain + feedback);
            }

            *y = out * wet;
        }
    }

    fn set_parameters(&mut self, params: &ReverbParameters) {
        self.params = params.clamped();
        self.update_loops();
    }
}
