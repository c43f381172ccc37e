//! Delay-and-sum FIR table designer
//!
//! Each microphone gets a windowed-sinc fractional delay that lines up a plane
//! wave from the steered direction at a common output time. Steering is given
//! as direction cosines: `x = sin(azimuth)`, `y = sin(elevation)`. Width
//! narrows the horizontal aperture, leaving the outer microphones silent.

use std::f64::consts::PI;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use bf_core::{BfError, BfResult, MicArrayConfig, Sample};
use bf_dsp::ImpulseResponseTable;

use crate::tables::{FirLibrary, FirTables, SteeringGrid};

/// Taps on either side of the fractional-delay centre
const SINC_HALF_WIDTH: f64 = 8.0;

/// Fraction of the aperture left at full width
const MIN_APERTURE: f64 = 0.25;

/// Delay-and-sum table generator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayAndSumDesign {
    pub sample_rate: f64,
    /// Taps per impulse response
    pub fir_len: usize,
    /// Horizontal steering positions
    pub steer_x: usize,
    /// Vertical steering positions (collapsed to 1 on linear arrays)
    pub steer_y: usize,
    /// Beam width steps
    pub widths: usize,
    /// Speed of sound [m/s]
    pub sound_speed: f64,
}

impl Default for DelayAndSumDesign {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            fir_len: 512,
            steer_x: 13,
            steer_y: 5,
            widths: 3,
            sound_speed: 343.0,
        }
    }
}

impl DelayAndSumDesign {
    pub fn new(sample_rate: f64, fir_len: usize) -> Self {
        Self {
            sample_rate,
            fir_len,
            ..Self::default()
        }
    }

    pub fn with_grid(mut self, steer_x: usize, steer_y: usize, widths: usize) -> Self {
        self.steer_x = steer_x;
        self.steer_y = steer_y;
        self.widths = widths;
        self
    }

    /// Steering grid used for `config`
    pub fn grid_for(&self, config: MicArrayConfig) -> SteeringGrid {
        let steer_y = if config.is_linear() { 1 } else { self.steer_y };
        SteeringGrid::new(self.steer_x, steer_y, self.widths)
    }

    /// Build beam and DOA tables for `config`
    pub fn design(&self, config: MicArrayConfig) -> BfResult<FirTables> {
        self.validate(config)?;

        let positions = config.mic_positions();
        let grid = self.grid_for(config);

        let mut beam = Vec::with_capacity(grid.len());
        for iw in 0..grid.widths {
            for iy in 0..grid.steer_y {
                for ix in 0..grid.steer_x {
                    let (x, y) = grid.steering(ix, iy);
                    beam.push(self.steered(&positions, x, y, grid.width(iw)));
                }
            }
        }

        let doa_grid = config.doa_grid();
        let doa = (0..doa_grid.len())
            .map(|cell| {
                let (x, y) = doa_grid.direction(cell);
                self.steered(&positions, x, y, 0.0)
            })
            .collect();

        log::debug!(
            "Designed delay-and-sum tables for {config:?}: {} beams, {} DOA cells, {} taps",
            grid.len(),
            doa_grid.len(),
            self.fir_len
        );

        Ok(FirTables {
            grid,
            beam: ImpulseResponseTable::new(beam)?,
            doa: ImpulseResponseTable::new(doa)?,
        })
    }

    fn validate(&self, config: MicArrayConfig) -> BfResult<()> {
        if !(self.sample_rate > 0.0 && self.sample_rate.is_finite()) {
            return Err(BfError::InvalidSampleRate(self.sample_rate));
        }
        if self.steer_x == 0 || self.steer_y == 0 || self.widths == 0 {
            return Err(BfError::InvalidParam(
                "steering grid needs at least one cell per axis".into(),
            ));
        }
        if self.sound_speed <= 0.0 {
            return Err(BfError::InvalidParam(format!("sound speed {}", self.sound_speed)));
        }

        let max_delay = config
            .mic_positions()
            .iter()
            .map(|&(px, py)| (px.abs() + py.abs()) as f64)
            .fold(0.0, f64::max)
            * self.sample_rate
            / self.sound_speed;
        let needed = 2 * (max_delay.ceil() as usize + SINC_HALF_WIDTH as usize) + 1;
        if self.fir_len < needed {
            return Err(BfError::TableShape(format!(
                "{} taps cannot hold {max_delay:.1} samples of delay for {config:?}, need {needed}",
                self.fir_len
            )));
        }
        Ok(())
    }

    /// Per-microphone responses for one look direction
    fn steered(&self, positions: &[(f32, f32)], x: f32, y: f32, width: f32) -> Vec<Vec<Sample>> {
        let center = (self.fir_len / 2) as f64;
        let samples_per_metre = self.sample_rate / self.sound_speed;

        let half_aperture = positions
            .iter()
            .map(|&(px, _)| px.abs() as f64)
            .fold(0.0, f64::max);
        let aperture = half_aperture * (1.0 - (1.0 - MIN_APERTURE) * width as f64);
        let active = |px: f32| (px.abs() as f64) <= aperture + 1e-6;
        let count = positions.iter().filter(|&&(px, _)| active(px)).count().max(1);
        let weight = 1.0 / count as f64;

        positions
            .iter()
            .map(|&(px, py)| {
                if !active(px) {
                    return vec![0.0; self.fir_len];
                }
                let projection = px as f64 * x as f64 + py as f64 * y as f64;
                fractional_delay(self.fir_len, center + projection * samples_per_metre, weight)
            })
            .collect()
    }
}

impl FirLibrary for DelayAndSumDesign {
    fn tables(&self, config: MicArrayConfig) -> BfResult<Arc<FirTables>> {
        Ok(Arc::new(self.design(config)?))
    }
}

/// Hann-windowed sinc delayed by `delay` samples, DC gain `gain`
fn fractional_delay(len: usize, delay: f64, gain: f64) -> Vec<Sample> {
    let mut taps: Vec<f64> = (0..len)
        .map(|n| {
            let t = n as f64 - delay;
            if t.abs() >= SINC_HALF_WIDTH {
                0.0
            } else {
                let window = 0.5 * (1.0 + (PI * t / SINC_HALF_WIDTH).cos());
                window * sinc(t)
            }
        })
        .collect();

    let sum: f64 = taps.iter().sum();
    let norm = if sum.abs() > 1e-12 { gain / sum } else { gain };
    for tap in &mut taps {
        *tap *= norm;
    }
    taps.into_iter().map(|t| t as Sample).collect()
}

#[inline]
fn sinc(t: f64) -> f64 {
    if t.abs() < 1e-12 {
        1.0
    } else {
        (PI * t).sin() / (PI * t)
    }
}
