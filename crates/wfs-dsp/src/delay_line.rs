//! Fractional delay line
//!
//! A circular buffer plus a write cursor that always points at the next slot
//! to overwrite. It is used two ways:
//!
//! - read-behind: write the input, then read it back `d` samples later
//!   (input-buffer processors, binaural processor);
//! - write-ahead: deposit contributions `d` samples in front of the cursor and
//!   consume the cursor slot once per sample, zeroing it so several sources can
//!   be summed onto the same output timeline (output-buffer processors).
//!
//! Both directions interpolate linearly between the two neighbouring slots.

use wfs_core::{Sample, delay_line_len};

#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<Sample>,
    write_pos: usize,
}

impl DelayLine {
    /// Create a delay line of exactly `len` samples (at least one)
    pub fn new(len: usize) -> Self {
        Self {
            buffer: vec![0.0; len.max(1)],
            write_pos: 0,
        }
    }

    /// One second of audio at `sample_rate`
    pub fn for_sample_rate(sample_rate: f64) -> Self {
        Self::new(delay_line_len(sample_rate))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Slot the next write lands in
    #[inline]
    pub fn write_pos(&self) -> usize {
        self.write_pos
    }

    /// Largest usable delay in samples
    #[inline]
    pub fn max_delay(&self) -> f32 {
        (self.buffer.len() - 1) as f32
    }

    /// Zero the buffer and rewind the cursor
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }

    #[inline]
    fn advance(&mut self) {
        self.write_pos += 1;
        if self.write_pos == self.buffer.len() {
            self.write_pos = 0;
        }
    }

    // ============ Read-behind ============

    /// Store one sample and advance
    #[inline]
    pub fn push(&mut self, input: Sample) {
        self.buffer[self.write_pos] = input;
        self.advance();
    }

    /// Store a block and advance past it. Returns the slot of the first sample.
    pub fn write_block(&mut self, input: &[Sample]) -> usize {
        let start = self.write_pos;
        for &sample in input {
            self.push(sample);
        }
        start
    }

    /// Read `delay` samples behind slot `now`, interpolating between the two
    /// neighbouring slots. `delay` is clamped to `[0, len - 1]`.
    #[inline]
    pub fn read_behind(&self, now: usize, delay: f32) -> Sample {
        let len = self.buffer.len();
        let delay = delay.clamp(0.0, self.max_delay()) as f64;
        let position = (now % len + len) as f64 - delay;
        let floor = position.floor();
        let frac = (position - floor) as f32;
        let i0 = floor as usize % len;
        let i1 = if i0 + 1 == len { 0 } else { i0 + 1 };
        self.buffer[i0] * (1.0 - frac) + self.buffer[i1] * frac
    }

    /// Read a whole number of samples behind slot `now`, clamped to `[0, len - 1]`
    #[inline]
    pub fn read_behind_integer(&self, now: usize, delay: usize) -> Sample {
        let len = self.buffer.len();
        let delay = delay.min(len - 1);
        self.buffer[(now % len + len - delay) % len]
    }

    // ============ Write-ahead ============

    /// Add `value` at `delay` samples in front of the cursor, split over the
    /// two neighbouring slots. `delay` is clamped to `[0, len - 1]`.
    #[inline]
    pub fn accumulate_ahead(&mut self, delay: f32, value: Sample) {
        let len = self.buffer.len();
        let delay = delay.clamp(0.0, self.max_delay()) as f64;
        let position = self.write_pos as f64 + delay;
        let floor = position.floor();
        let frac = (position - floor) as f32;
        let i0 = floor as usize % len;
        let i1 = if i0 + 1 == len { 0 } else { i0 + 1 };
        self.buffer[i0] += value * (1.0 - frac);
        self.buffer[i1] += value * frac;
    }

    /// Consume the cursor slot: return it, zero it, advance
    #[inline]
    pub fn take_current(&mut self) -> Sample {
        let value = std::mem::take(&mut self.buffer[self.write_pos]);
        self.advance();
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_integer_read_behind() {
        let mut line = DelayLine::new(16);
        let mut out = Vec::new();
        for n in 0..10 {
            let now = line.write_pos();
            line.push(if n == 0 { 1.0 } else { 0.0 });
            out.push(line.read_behind(now, 3.0));
        }
        assert_eq!(out[3], 1.0);
        assert_eq!(out.iter().sum::<f32>(), 1.0);
    }

    #[test]
    fn test_fractional_read_behind_splits() {
        let mut line = DelayLine::new(16);
        let start = line.write_block(&[1.0, 0.0, 0.0, 0.0, 0.0]);
        // Time 0.75 weights slot 0 by a quarter
        assert_abs_diff_eq!(line.read_behind(start + 1, 0.25), 0.25);
        assert_abs_diff_eq!(line.read_behind(start + 1, 0.75), 0.75);
        assert_abs_diff_eq!(line.read_behind(start + 2, 1.75), 0.75);
        assert_abs_diff_eq!(line.read_behind(start + 3, 1.25), 0.0);
    }

    #[test]
    fn test_read_behind_wraps() {
        let mut line = DelayLine::new(8);
        for n in 0..14 {
            line.push(n as f32);
        }
        // Last written value 13 sits in slot 5
        let now = (line.write_pos() + 7) % 8;
        assert_eq!(line.read_behind(now, 0.0), 13.0);
        assert_eq!(line.read_behind(now, 6.0), 7.0);
    }

    #[test]
    fn test_delay_is_clamped() {
        let mut line = DelayLine::new(4);
        line.write_block(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(line.read_behind(3, 100.0), line.read_behind(3, 3.0));
        assert_eq!(line.read_behind(3, -5.0), 4.0);
    }

    #[test]
    fn test_write_ahead_impulse() {
        let mut line = DelayLine::new(32);
        let mut out = Vec::new();
        for n in 0..20 {
            if n == 0 {
                line.accumulate_ahead(5.0, 1.0);
            }
            out.push(line.take_current());
        }
        assert_eq!(out[5], 1.0);
        assert_eq!(out.iter().sum::<f32>(), 1.0);
    }

    #[test]
    fn test_write_ahead_zero_delay_is_immediate() {
        let mut line = DelayLine::new(8);
        line.accumulate_ahead(0.0, 0.5);
        assert_eq!(line.take_current(), 0.5);
    }

    #[test]
    fn test_write_ahead_sums_and_clears() {
        let mut line = DelayLine::new(8);
        line.accumulate_ahead(2.5, 1.0);
        line.accumulate_ahead(2.0, 1.0);
        let out: Vec<f32> = (0..8).map(|_| line.take_current()).collect();
        assert_abs_diff_eq!(out[2], 1.5);
        assert_abs_diff_eq!(out[3], 0.5);
        // Slots were zeroed on the way past
        let again: Vec<f32> = (0..8).map(|_| line.take_current()).collect();
        assert!(again.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_clear() {
        let mut line = DelayLine::new(8);
        line.write_block(&[1.0; 5]);
        line.clear();
        assert_eq!(line.write_pos(), 0);
        assert_eq!(line.read_behind(7, 3.0), 0.0);
    }
}
