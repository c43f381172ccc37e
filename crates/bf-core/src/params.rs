//! Beam parameter types

use serde::{Deserialize, Serialize};

/// Maximum linear beam gain accepted by [`BeamParameters::clamped`]
pub const MAX_BEAM_GAIN: f32 = 100.0;

/// Steering, width, pan and gain of a single beam
///
/// Values are expected pre-validated by the caller; [`clamped`](Self::clamped)
/// applies the documented ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamParameters {
    /// Horizontal steering, -1.0 (left) to 1.0 (right)
    pub steer_x: f32,
    /// Vertical steering, -1.0 to 1.0 (ignored by linear arrays)
    pub steer_y: f32,
    /// Beam width, 0.0 (narrowest) to 1.0 (widest)
    pub width: f32,
    /// Stereo pan, -1.0 (left) to 1.0 (right)
    pub pan: f32,
    /// Linear gain
    pub gain: f32,
}

impl BeamParameters {
    pub fn new(steer_x: f32, width: f32) -> Self {
        Self {
            steer_x,
            width,
            ..Self::default()
        }
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    pub fn with_pan(mut self, pan: f32) -> Self {
        self.pan = pan;
        self
    }

    pub fn with_steer_y(mut self, steer_y: f32) -> Self {
        self.steer_y = steer_y;
        self
    }

    /// Clamp every field to its documented range
    pub fn clamped(self) -> Self {
        Self {
            steer_x: self.steer_x.clamp(-1.0, 1.0),
            steer_y: self.steer_y.clamp(-1.0, 1.0),
            width: self.width.clamp(0.0, 1.0),
            pan: self.pan.clamp(-1.0, 1.0),
            gain: self.gain.clamp(0.0, MAX_BEAM_GAIN),
        }
    }
}

impl Default for BeamParameters {
    fn default() -> Self {
        Self {
            steer_x: 0.0,
            steer_y: 0.0,
            width: 0.0,
            pan: 0.0,
            gain: 1.0,
        }
    }
}
