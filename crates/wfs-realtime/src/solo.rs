//! Per-input solo flags
//!
//! Written by the control thread, read by the binaural processor once per
//! input per block. While any input is soloed only soloed inputs are heard.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub struct SoloMask {
    flags: Vec<AtomicBool>,
    soloed: AtomicUsize,
}

impl SoloMask {
    pub fn new(num_inputs: usize) -> Self {
        Self {
            flags: (0..num_inputs).map(|_| AtomicBool::new(false)).collect(),
            soloed: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.flags.len()
    }

    /// Set one input's solo flag. Out-of-range inputs are ignored.
    pub fn set_soloed(&self, input: usize, soloed: bool) {
        let Some(flag) = self.flags.get(input) else {
            return;
        };
        if flag.swap(soloed, Ordering::AcqRel) != soloed {
            if soloed {
                self.soloed.fetch_add(1, Ordering::Release);
            } else {
                self.soloed.fetch_sub(1, Ordering::Release);
            }
        }
    }

    #[inline]
    pub fn is_input_soloed(&self, input: usize) -> bool {
        self.flags
            .get(input)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    #[inline]
    pub fn num_soloed_inputs(&self) -> usize {
        self.soloed.load(Ordering::Acquire)
    }

    /// True if this input should be heard under the current solo state
    #[inline]
    pub fn is_audible(&self, input: usize) -> bool {
        self.num_soloed_inputs() == 0 || self.is_input_soloed(input)
    }

    pub fn clear(&self) {
        for input in 0..self.flags.len() {
            self.set_soloed(input, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_solo_everyone_audible() {
        let mask = SoloMask::new(3);
        assert_eq!(mask.num_soloed_inputs(), 0);
        assert!((0..3).all(|i| mask.is_audible(i)));
    }

    #[test]
    fn test_solo_silences_others() {
        let mask = SoloMask::new(3);
        mask.set_soloed(1, true);
        assert_eq!(mask.num_soloed_inputs(), 1);
        assert!(!mask.is_audible(0));
        assert!(mask.is_audible(1));
        assert!(!mask.is_audible(2));
    }

    #[test]
    fn test_count_ignores_repeats() {
        let mask = SoloMask::new(2);
        mask.set_soloed(0, true);
        mask.set_soloed(0, true);
        assert_eq!(mask.num_soloed_inputs(), 1);
        mask.set_soloed(0, false);
        mask.set_soloed(0, false);
        assert_eq!(mask.num_soloed_inputs(), 0);
    }

    #[test]
    fn test_out_of_range_ignored() {
        let mask = SoloMask::new(1);
        mask.set_soloed(5, true);
        assert_eq!(mask.num_soloed_inputs(), 0);
        assert!(!mask.is_input_soloed(5));
    }

    #[test]
    fn test_clear() {
        let mask = SoloMask::new(4);
        mask.set_soloed(0, true);
        mask.set_soloed(3, true);
        mask.clear();
        assert_eq!(mask.num_soloed_inputs(), 0);
    }
}
