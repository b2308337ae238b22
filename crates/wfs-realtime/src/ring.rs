//! SPSC sample rings
//!
//! Thin wrappers over `rtrb` that move blocks of samples instead of single
//! values. The driver callback owns one end of every ring and exactly one
//! processor thread owns the other.
//!
//! Neither side ever blocks. A write that does not fit keeps what fits and
//! drops the rest; a read returns only what is queued.

use rtrb::{Consumer, Producer, RingBuffer};
use wfs_core::Sample;

/// Create a ring holding up to `capacity` samples
pub fn sample_ring(capacity: usize) -> (SampleWriter, SampleReader) {
    let capacity = capacity.max(1);
    let (producer, consumer) = RingBuffer::new(capacity);
    (SampleWriter { producer }, SampleReader { consumer })
}

/// Producer side
pub struct SampleWriter {
    producer: Producer<Sample>,
}

impl SampleWriter {
    /// Queue as much of `data` as fits. Returns the number of samples queued.
    pub fn write(&mut self, data: &[Sample]) -> usize {
        let n = data.len().min(self.producer.slots());
        if n == 0 {
            return 0;
        }
        match self.producer.write_chunk(n) {
            Ok(mut chunk) => {
                let (first, second) = chunk.as_mut_slices();
                let split = first.len();
                first.copy_from_slice(&data[..split]);
                second.copy_from_slice(&data[split..n]);
                chunk.commit_all();
                n
            }
            Err(_) => 0,
        }
    }

    /// Samples that can be written right now
    #[inline]
    pub fn free_space(&self) -> usize {
        self.producer.slots()
    }
}

/// Consumer side
pub struct SampleReader {
    consumer: Consumer<Sample>,
}

impl SampleReader {
    /// Samples queued and ready to read
    #[inline]
    pub fn available(&self) -> usize {
        self.consumer.slots()
    }

    /// Move up to `dest.len()` samples into `dest`. Returns the number read;
    /// the rest of `dest` is left untouched.
    pub fn read(&mut self, dest: &mut [Sample]) -> usize {
        let n = dest.len().min(self.consumer.slots());
        if n == 0 {
            return 0;
        }
        match self.consumer.read_chunk(n) {
            Ok(chunk) => {
                let (first, second) = chunk.as_slices();
                let split = first.len();
                dest[..split].copy_from_slice(first);
                dest[split..n].copy_from_slice(second);
                chunk.commit_all();
                n
            }
            Err(_) => 0,
        }
    }

    /// Discard up to `n` queued samples. Returns the number discarded.
    pub fn skip(&mut self, n: usize) -> usize {
        let n = n.min(self.consumer.slots());
        if n == 0 {
            return 0;
        }
        match self.consumer.read_chunk(n) {
            Ok(chunk) => {
                chunk.commit_all();
                n
            }
            Err(_) => 0,
        }
    }

    /// Discard everything queued
    pub fn clear(&mut self) -> usize {
        self.skip(self.consumer.slots())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_in_order() {
        let (mut tx, mut rx) = sample_ring(8);
        assert_eq!(tx.write(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(rx.available(), 3);

        let mut out = [0.0; 4];
        assert_eq!(rx.read(&mut out), 3);
        assert_eq!(out, [1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn test_overflow_drops_tail() {
        let (mut tx, mut rx) = sample_ring(4);
        assert_eq!(tx.write(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]), 4);
        assert_eq!(tx.free_space(), 0);
        assert_eq!(tx.write(&[7.0]), 0);

        let mut out = [0.0; 6];
        assert_eq!(rx.read(&mut out), 4);
        assert_eq!(&out[..4], &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_wraparound() {
        let (mut tx, mut rx) = sample_ring(5);
        let mut out = [0.0; 3];
        for round in 0..10 {
            let base = round as f32 * 3.0;
            assert_eq!(tx.write(&[base, base + 1.0, base + 2.0]), 3);
            assert_eq!(rx.read(&mut out), 3);
            assert_eq!(out, [base, base + 1.0, base + 2.0]);
        }
    }

    #[test]
    fn test_read_empty() {
        let (_tx, mut rx) = sample_ring(4);
        let mut out = [9.0; 2];
        assert_eq!(rx.read(&mut out), 0);
        assert_eq!(out, [9.0; 2]);
    }

    #[test]
    fn test_skip_and_clear() {
        let (mut tx, mut rx) = sample_ring(16);
        tx.write(&[1.0; 10]);
        assert_eq!(rx.skip(4), 4);
        assert_eq!(rx.available(), 6);
        assert_eq!(rx.clear(), 6);
        assert_eq!(rx.available(), 0);
        assert_eq!(tx.free_space(), 16);
    }
}
