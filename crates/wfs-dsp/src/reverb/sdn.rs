//! Scattering delay network
//!
//! One scattering node per wall of a shoebox room, placed at the first-order
//! reflection point between source and listener. Nodes exchange energy over
//! bidirectional waveguides whose lengths are the node-to-node distances, so
//! first-order reflections arrive at exactly the right time and higher orders
//! are approximated. The scattering matrix is the isotropic
//! `A = 2/(K-1) · 11ᵀ - I`, scaled by the wall reflection coefficient.
//!
//! The direct path is not rendered here.

use wfs_core::Sample;

use super::{ReverbAlgorithm, ReverbGeometry, ReverbParameters, SPEED_OF_SOUND};
use crate::delay_line::DelayLine;

const K: usize = 6;

pub struct SdnReverb {
    geometry: ReverbGeometry,
    params: ReverbParameters,
    sample_rate: f64,
    source_line: DelayLine,
    /// `waveguides[j * K + k]` carries node j's output toward node k
    waveguides: Vec<DelayLine>,
    listener_lines: Vec<DelayLine>,
    source_delay: [usize; K],
    source_gain: [f32; K],
    listener_delay: [usize; K],
    listener_gain: [f32; K],
    node_delay: [[usize; K]; K],
    reflection: f32,
    damping_state: [f32; K],
    outgoing: [[f32; K]; K],
}

impl Default for SdnReverb {
    fn default() -> Self {
        Self::new()
    }
}

impl SdnReverb {
    pub fn new() -> Self {
        let mut reverb = Self {
            geometry: ReverbGeometry::default(),
            params: ReverbParameters::default(),
            sample_rate: 48000.0,
            source_line: DelayLine::new(1),
            waveguides: Vec::new(),
            listener_lines: Vec::new(),
            source_delay: [1; K],
            source_gain: [0.0; K],
            listener_delay: [1; K],
            listener_gain: [0.0; K],
            node_delay: [[1; K]; K],
            reflection: 1.0,
            damping_state: [0.0; K],
            outgoing: [[0.0; K]; K],
        };
        reverb.prepare(48000.0, 512);
        reverb
    }

    /// Node positions: first-order reflection points on the six walls
    pub fn node_positions(geometry: &ReverbGeometry) -> [[f32; 3]; K] {
        let mut nodes = [[0.0; 3]; K];
        for axis in 0..3 {
            for (side, wall) in [0.0, geometry.room[axis]].into_iter().enumerate() {
                let s = geometry.source[axis];
                let l = geometry.listener[axis];
                // Distances of source and listener from this wall
                let ds = (s - wall).abs();
                let dl = (l - wall).abs();
                let t = if ds + dl > 0.0 { ds / (ds + dl) } else { 0.5 };

                let mut point = [0.0; 3];
                for (i, p) in point.iter_mut().enumerate() {
                    *p = geometry.source[i] + t * (geometry.listener[i] - geometry.source[i]);
                }
                point[axis] = wall;
                nodes[axis * 2 + side] = point;
            }
        }
        nodes
    }

    fn samples_for(&self, distance: f32) -> usize {
        ((distance / SPEED_OF_SOUND) as f64 * self.sample_rate).round().max(1.0) as usize
    }

    fn rebuild(&mut self) {
        let geometry = self.geometry;
        let nodes = Self::node_positions(&geometry);

        let mut longest = 1;
        for k in 0..K {
            let d_sk = distance(&geometry.source, &nodes[k]).max(0.1);
            let d_kl = distance(&nodes[k], &geometry.listener).max(0.1);
            self.source_delay[k] = self.samples_for(d_sk);
            self.listener_delay[k] = self.samples_for(d_kl);
            self.source_gain[k] = (1.0 / d_sk).min(1.0);
            self.listener_gain[k] = 1.0 / (1.0 + d_kl / d_sk);
            longest = longest.max(self.source_delay[k]).max(self.listener_delay[k]);

            for j in 0..K {
                let d = if j == k {
                    1
                } else {
                    self.samples_for(distance(&nodes[j], &nodes[k]))
                };
                self.node_delay[j][k] = d;
                longest = longest.max(d);
            }
        }

        let absorption = geometry.absorption.clamp(0.0, 1.0);
        self.reflection = (1.0 - absorption).sqrt();

        let capacity = longest + 1;
        if self.source_line.len() < capacity {
            self.source_line = DelayLine::new(capacity);
            self.waveguides = (0..K * K).map(|_| DelayLine::new(capacity)).collect();
            self.listener_lines = (0..K).map(|_| DelayLine::new(capacity)).collect();
        }
    }
}

fn distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

impl ReverbAlgorithm for SdnReverb {
    fn prepare(&mut self, sample_rate: f64, _max_block_size: usize) {
        self.sample_rate = sample_rate;
        self.source_line = DelayLine::new(1);
        self.rebuild();
        self.reset();
    }

    fn reset(&mut self) {
        self.source_line.clear();
        for line in self.waveguides.iter_mut().chain(self.listener_lines.iter_mut()) {
            line.clear();
        }
        self.damping_state = [0.0; K];
        self.outgoing = [[0.0; K]; K];
    }

    fn process_block(&mut self, input: &[Sample], output: &mut [Sample]) {
        let scatter = 2.0 / (K - 1) as f32;
        let damping = self.params.damping;
        let wet = self.params.wet;

        for (x, y) in input.iter().zip(output.iter_mut()) {
            let now = self.source_line.write_pos();
            self.source_line.push(*x);

            let mut wet_sum = 0.0;
            for k in 0..K {
                let injected = 0.5
                    * self.source_gain[k]
                    * self.source_line.read_behind_integer(now, self.source_delay[k]);

                let mut incoming = [0.0f32; K];
                let mut sum = 0.0;
                for j in (0..K).filter(|&j| j != k) {
                    let guide = &self.waveguides[j * K + k];
                    incoming[j] =
                        guide.read_behind_integer(guide.write_pos(), self.node_delay[j][k]) + injected;
                    sum += incoming[j];
                }

                let mut node_pressure = 0.0;
                for j in (0..K).filter(|&j| j != k) {
                    let out = self.reflection * (scatter * sum - incoming[j]);
                    self.outgoing[k][j] = out;
                    node_pressure += out;
                }
                node_pressure *= scatter;

                let state = &mut self.damping_state[k];
                *state = (1.0 - damping) * node_pressure + damping * *state;

                let line = &mut self.listener_lines[k];
                let slot = line.write_pos();
                line.push(*state * self.listener_gain[k]);
                wet_sum += line.read_behind_integer(slot, self.listener_delay[k]);
            }

            // Waveguides are written only after every node has read them
            for k in 0..K {
                for j in (0..K).filter(|&j| j != k) {
                    self.waveguides[k * K + j].push(self.outgoing[k][j]);
                }
            }

            *y = wet_sum * wet;
        }
    }

    fn set_parameters(&mut self, params: &ReverbParameters) {
        self.params = params.clamped();
    }

    fn update_geometry(&mut self, geometry: &ReverbGeometry) {
        self.geometry = *geometry;
        self.rebuild();
    }
}
