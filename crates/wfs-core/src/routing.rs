//! Routing coefficient snapshot
//!
//! The calculation engine turns source/speaker geometry into flat
//! `num_inputs × num_outputs` coefficient arrays indexed `input * num_outputs + output`.
//! A snapshot is immutable once published; the real-time crate swaps whole
//! snapshots instead of mutating coefficients in place.

use serde::{Deserialize, Serialize};

use crate::{WfsError, WfsResult};

/// Per-(input, output) contribution
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Route {
    /// Propagation delay in milliseconds
    pub delay_ms: f32,
    /// Linear level, 0 = no contribution
    pub level: f32,
    /// High-frequency (air absorption) attenuation in dB, <= 0
    pub hf_atten_db: f32,
}

impl Route {
    pub const SILENT: Self = Self {
        delay_ms: 0.0,
        level: 0.0,
        hf_atten_db: 0.0,
    };

    pub const fn new(delay_ms: f32, level: f32, hf_atten_db: f32) -> Self {
        Self {
            delay_ms,
            level,
            hf_atten_db,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.level != 0.0
    }
}

/// Per-input floor reflection coloration and diffusion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FloorReflectionSettings {
    pub low_cut_enabled: bool,
    /// Hz
    pub low_cut_freq: f32,
    pub high_shelf_enabled: bool,
    /// Hz
    pub high_shelf_freq: f32,
    pub high_shelf_gain_db: f32,
    /// Shelf slope (0.1 - 0.9)
    pub high_shelf_slope: f32,
    /// 0 - 100 %, each percent allows 0.05 ms of delay jitter
    pub diffusion_percent: f32,
}

impl Default for FloorReflectionSettings {
    fn default() -> Self {
        Self {
            low_cut_enabled: false,
            low_cut_freq: 100.0,
            high_shelf_enabled: false,
            high_shelf_freq: 3000.0,
            high_shelf_gain_db: 0.0,
            high_shelf_slope: 0.5,
            diffusion_percent: 0.0,
        }
    }
}

/// Per-input stereo route for the binaural pair (index 0 = left, 1 = right)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BinauralRoute {
    pub delay_ms: [f32; 2],
    pub level: [f32; 2],
    pub hf_atten_db: [f32; 2],
}

impl BinauralRoute {
    /// Route for one ear
    #[inline]
    pub fn ear(&self, ear: usize) -> Route {
        match ear {
            0 | 1 => Route::new(self.delay_ms[ear], self.level[ear], self.hf_atten_db[ear]),
            _ => Route::SILENT,
        }
    }
}

/// Immutable set of routing coefficients for one topology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingSnapshot {
    num_inputs: usize,
    num_outputs: usize,
    delay_ms: Vec<f32>,
    level: Vec<f32>,
    hf_atten_db: Vec<f32>,
    /// Extra delay of the reflected path on top of the direct delay
    fr_delay_ms: Vec<f32>,
    fr_level: Vec<f32>,
    fr_hf_atten_db: Vec<f32>,
    floor_reflection: Vec<FloorReflectionSettings>,
    binaural: Vec<BinauralRoute>,
}

impl RoutingSnapshot {
    /// All routes silent
    pub fn new(num_inputs: usize, num_outputs: usize) -> Self {
        let pairs = num_inputs * num_outputs;
        Self {
            num_inputs,
            num_outputs,
            delay_ms: vec![0.0; pairs],
            level: vec![0.0; pairs],
            hf_atten_db: vec![0.0; pairs],
            fr_delay_ms: vec![0.0; pairs],
            fr_level: vec![0.0; pairs],
            fr_hf_atten_db: vec![0.0; pairs],
            floor_reflection: vec![FloorReflectionSettings::default(); num_inputs],
            binaural: vec![BinauralRoute::default(); num_inputs],
        }
    }

    /// Build from the three direct-path arrays (no floor reflection)
    pub fn from_arrays(
        num_inputs: usize,
        num_outputs: usize,
        delay_ms: Vec<f32>,
        level: Vec<f32>,
        hf_atten_db: Vec<f32>,
    ) -> WfsResult<Self> {
        let pairs = num_inputs * num_outputs;
        for (name, array) in [
            ("delay_ms", &delay_ms),
            ("level", &level),
            ("hf_atten_db", &hf_atten_db),
        ] {
            if array.len() != pairs {
                return Err(WfsError::InvalidParam(format!(
                    "{name} has {} entries, expected {pairs}",
                    array.len()
                )));
            }
        }

        Ok(Self {
            delay_ms,
            level,
            hf_atten_db,
            ..Self::new(num_inputs, num_outputs)
        })
    }

    #[inline]
    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    #[inline]
    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    #[inline]
    fn index(&self, input: usize, output: usize) -> Option<usize> {
        (input < self.num_inputs && output < self.num_outputs)
            .then(|| input * self.num_outputs + output)
    }

    fn checked_index(&self, input: usize, output: usize) -> WfsResult<usize> {
        if input >= self.num_inputs {
            return Err(WfsError::ChannelOutOfRange {
                index: input,
                count: self.num_inputs,
            });
        }
        self.index(input, output).ok_or(WfsError::ChannelOutOfRange {
            index: output,
            count: self.num_outputs,
        })
    }

    /// Direct route, silent when out of range
    #[inline]
    pub fn direct(&self, input: usize, output: usize) -> Route {
        match self.index(input, output) {
            Some(i) => Route::new(self.delay_ms[i], self.level[i], self.hf_atten_db[i]),
            None => Route::SILENT,
        }
    }

    /// Floor reflection route; `delay_ms` is the extra delay over the direct path
    #[inline]
    pub fn floor_reflection(&self, input: usize, output: usize) -> Route {
        match self.index(input, output) {
            Some(i) => Route::new(self.fr_delay_ms[i], self.fr_level[i], self.fr_hf_atten_db[i]),
            None => Route::SILENT,
        }
    }

    #[inline]
    pub fn floor_reflection_settings(&self, input: usize) -> FloorReflectionSettings {
        self.floor_reflection.get(input).copied().unwrap_or_default()
    }

    #[inline]
    pub fn binaural(&self, input: usize) -> BinauralRoute {
        self.binaural.get(input).copied().unwrap_or_default()
    }

    pub fn set_direct(&mut self, input: usize, output: usize, route: Route) -> WfsResult<()> {
        let i = self.checked_index(input, output)?;
        self.delay_ms[i] = route.delay_ms;
        self.level[i] = route.level;
        self.hf_atten_db[i] = route.hf_atten_db;
        Ok(())
    }

    pub fn set_floor_reflection(
        &mut self,
        input: usize,
        output: usize,
        route: Route,
    ) -> WfsResult<()> {
        let i = self.checked_index(input, output)?;
        self.fr_delay_ms[i] = route.delay_ms;
        self.fr_level[i] = route.level;
        self.fr_hf_atten_db[i] = route.hf_atten_db;
        Ok(())
    }

    pub fn set_floor_reflection_settings(
        &mut self,
        input: usize,
        settings: FloorReflectionSettings,
    ) -> WfsResult<()> {
        let count = self.num_inputs;
        let slot = self
            .floor_reflection
            .get_mut(input)
            .ok_or(WfsError::ChannelOutOfRange { index: input, count })?;
        *slot = settings;
        Ok(())
    }

    pub fn set_binaural(&mut self, input: usize, route: BinauralRoute) -> WfsResult<()> {
        let count = self.num_inputs;
        let slot = self
            .binaural
            .get_mut(input)
            .ok_or(WfsError::ChannelOutOfRange { index: input, count })?;
        *slot = route;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_silent() {
        let snapshot = RoutingSnapshot::new(3, 4);
        for input in 0..3 {
            for output in 0..4 {
                assert!(!snapshot.direct(input, output).is_active());
                assert!(!snapshot.floor_reflection(input, output).is_active());
            }
        }
    }

    #[test]
    fn test_flat_index_layout() {
        let mut level = vec![0.0; 6];
        level[1 * 3 + 2] = 0.5;
        let snapshot =
            RoutingSnapshot::from_arrays(2, 3, vec![0.0; 6], level, vec![0.0; 6]).unwrap();
        assert_eq!(snapshot.direct(1, 2).level, 0.5);
        assert_eq!(snapshot.direct(2, 1).level, 0.0);
    }

    #[test]
    fn test_from_arrays_length_mismatch() {
        let result = RoutingSnapshot::from_arrays(2, 2, vec![0.0; 4], vec![0.0; 3], vec![0.0; 4]);
        assert!(matches!(result, Err(WfsError::InvalidParam(_))));
    }

    #[test]
    fn test_out_of_range_reads_silent() {
        let snapshot = RoutingSnapshot::new(1, 1);
        assert_eq!(snapshot.direct(5, 0), Route::SILENT);
        assert_eq!(snapshot.floor_reflection(0, 9), Route::SILENT);
        assert_eq!(snapshot.binaural(3), BinauralRoute::default());
    }

    #[test]
    fn test_out_of_range_write_rejected() {
        let mut snapshot = RoutingSnapshot::new(1, 2);
        assert!(matches!(
            snapshot.set_direct(0, 2, Route::new(1.0, 1.0, 0.0)),
            Err(WfsError::ChannelOutOfRange { index: 2, count: 2 })
        ));
        assert!(snapshot.set_direct(0, 1, Route::new(1.0, 1.0, 0.0)).is_ok());
    }

    #[test]
    fn test_floor_reflection_is_independent_of_direct() {
        let mut snapshot = RoutingSnapshot::new(1, 1);
        snapshot
            .set_floor_reflection(0, 0, Route::new(2.0, 0.3, -1.0))
            .unwrap();
        assert_eq!(snapshot.floor_reflection(0, 0), Route::new(2.0, 0.3, -1.0));
        assert!(!snapshot.direct(0, 0).is_active());
    }
}
