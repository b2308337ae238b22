//! Reverb node bank
//!
//! Many independent reverb nodes (one per room zone or cluster) rendered
//! each block on the fork-join pool, one node per pool index.

use std::cell::UnsafeCell;

use wfs_core::{Sample, WfsError, WfsResult};
use wfs_dsp::reverb::{Reverb, ReverbAlgorithm, ReverbGeometry, ReverbParameters};

use crate::pool::ParallelFor;

/// Which algorithm a bank's nodes run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReverbKind {
    Fdn,
    Sdn,
}

impl ReverbKind {
    fn create(self) -> Reverb {
        match self {
            Self::Fdn => Reverb::fdn(),
            Self::Sdn => Reverb::sdn(),
        }
    }
}

struct ReverbNode {
    reverb: Reverb,
    input: Vec<Sample>,
    output: Vec<Sample>,
}

impl ReverbNode {
    fn process(&mut self, num_samples: usize) {
        self.reverb
            .process_block(&self.input[..num_samples], &mut self.output[..num_samples]);
    }
}

/// Node slots handed to the pool. Each index is touched by exactly one
/// participant per dispatch.
struct NodeSlots<'a>(&'a [UnsafeCell<ReverbNode>]);

// SAFETY: `ParallelFor::run` calls every index exactly once per dispatch, so
// no two threads ever reach the same cell
unsafe impl Sync for NodeSlots<'_> {}

impl NodeSlots<'_> {
    /// SAFETY: caller must be the only user of `index` for the borrow
    #[allow(clippy::mut_from_ref)]
    unsafe fn get(&self, index: usize) -> &mut ReverbNode {
        unsafe { &mut *self.0[index].get() }
    }
}

pub struct ReverbNodeBank {
    nodes: Vec<UnsafeCell<ReverbNode>>,
    max_block_size: usize,
    pool: ParallelFor,
}

impl ReverbNodeBank {
    pub fn new(
        num_nodes: usize,
        kind: ReverbKind,
        sample_rate: f64,
        max_block_size: usize,
        pool: ParallelFor,
    ) -> WfsResult<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(WfsError::InvalidSampleRate(sample_rate));
        }
        if max_block_size == 0 {
            return Err(WfsError::InvalidConfig("max_block_size must be > 0".into()));
        }

        let nodes = (0..num_nodes)
            .map(|_| {
                let mut reverb = kind.create();
                reverb.prepare(sample_rate, max_block_size);
                UnsafeCell::new(ReverbNode {
                    reverb,
                    input: vec![0.0; max_block_size],
                    output: vec![0.0; max_block_size],
                })
            })
            .collect();

        log::debug!(
            "Reverb bank: {num_nodes} {kind:?} nodes on {} pool workers",
            pool.num_workers()
        );
        Ok(Self {
            nodes,
            max_block_size,
            pool,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node_mut(&mut self, index: usize) -> Option<&mut ReverbNode> {
        self.nodes.get_mut(index).map(UnsafeCell::get_mut)
    }

    /// Input buffer of one node, `max_block_size` long
    pub fn input_mut(&mut self, index: usize) -> Option<&mut [Sample]> {
        self.node_mut(index).map(|node| node.input.as_mut_slice())
    }

    /// Output of the last `process` call
    pub fn output(&mut self, index: usize) -> Option<&[Sample]> {
        self.node_mut(index).map(|node| node.output.as_slice())
    }

    pub fn set_parameters(&mut self, index: usize, params: &ReverbParameters) {
        if let Some(node) = self.node_mut(index) {
            node.reverb.set_parameters(params);
        }
    }

    pub fn update_geometry(&mut self, index: usize, geometry: &ReverbGeometry) {
        if let Some(node) = self.node_mut(index) {
            node.reverb.update_geometry(geometry);
        }
    }

    pub fn reset(&mut self) {
        for cell in &mut self.nodes {
            let node = cell.get_mut();
            node.reverb.reset();
            node.input.fill(0.0);
            node.output.fill(0.0);
        }
    }

    /// Render `num_samples` (clamped to the block size) on every node in
    /// parallel
    pub fn process(&mut self, num_samples: usize) {
        let num_samples = num_samples.min(self.max_block_size);
        let slots = NodeSlots(&self.nodes);
        self.pool.run(slots.0.len(), |index| {
            // SAFETY: each index is dispatched exactly once
            unsafe { slots.get(index) }.process(num_samples);
        });
    }

    /// Same as [`process`](Self::process) without the pool
    pub fn process_sequential(&mut self, num_samples: usize) {
        let num_samples = num_samples.min(self.max_block_size);
        for cell in &mut self.nodes {
            cell.get_mut().process(num_samples);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(kind: ReverbKind, nodes: usize, workers: usize) -> ReverbNodeBank {
        let pool = ParallelFor::new(workers).unwrap();
        ReverbNodeBank::new(nodes, kind, 48000.0, 256, pool).unwrap()
    }

    fn feed_impulses(bank: &mut ReverbNodeBank) {
        for index in 0..bank.len() {
            let input = bank.input_mut(index).unwrap();
            input.fill(0.0);
            input[index % 256] = 1.0;
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        for kind in [ReverbKind::Fdn, ReverbKind::Sdn] {
            let mut parallel = bank(kind, 6, 3);
            let mut sequential = bank(kind, 6, 0);

            for block in 0..40 {
                if block == 0 {
                    feed_impulses(&mut parallel);
                    feed_impulses(&mut sequential);
                } else {
                    for index in 0..6 {
                        parallel.input_mut(index).unwrap().fill(0.0);
                        sequential.input_mut(index).unwrap().fill(0.0);
                    }
                }
                parallel.process(256);
                sequential.process_sequential(256);

                for index in 0..6 {
                    assert_eq!(
                        parallel.output(index).unwrap(),
                        sequential.output(index).unwrap()
                    );
                }
            }
        }
    }

    #[test]
    fn test_geometry_reaches_one_node() {
        let mut bank = bank(ReverbKind::Sdn, 2, 1);
        bank.update_geometry(
            1,
            &ReverbGeometry {
                room: [30.0, 20.0, 10.0],
                ..Default::default()
            },
        );

        let mut rendered = [Vec::new(), Vec::new()];
        for block in 0..20 {
            for index in 0..2 {
                let input = bank.input_mut(index).unwrap();
                input.fill(0.0);
                if block == 0 {
                    input[0] = 1.0;
                }
            }
            bank.process(256);
            for (index, out) in rendered.iter_mut().enumerate() {
                out.extend_from_slice(bank.output(index).unwrap());
            }
        }
        assert_ne!(rendered[0], rendered[1]);
    }

    #[test]
    fn test_reset_silences_every_node() {
        let mut bank = bank(ReverbKind::Fdn, 3, 2);
        feed_impulses(&mut bank);
        bank.process(256);
        bank.reset();
        bank.process(256);
        for index in 0..3 {
            assert!(bank.output(index).unwrap().iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn test_out_of_range_node() {
        let mut bank = bank(ReverbKind::Fdn, 1, 0);
        assert!(bank.input_mut(3).is_none());
        assert!(bank.output(3).is_none());
        bank.set_parameters(3, &ReverbParameters::default());
    }
}
