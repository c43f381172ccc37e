//! bf-core: Shared types for the beamforming engine
//!
//! This crate provides the foundational types used across all beamforming crates:
//! sample buffers, microphone array layouts, beam parameters and errors.

mod array;
mod error;
mod params;
mod sample;

pub use array::*;
pub use error::*;
pub use params::*;
pub use sample::*;

/// Floor used when converting silence to decibels
pub const MIN_DB: f32 = -100.0;

/// Decibel value wrapper
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Decibels(pub f32);

impl Decibels {
    pub const ZERO: Self = Self(0.0);
    pub const FLOOR: Self = Self(MIN_DB);

    /// Convert a linear gain, clamping silence to [`MIN_DB`]
    #[inline]
    pub fn from_gain(gain: f32) -> Self {
        if gain <= 0.0 {
            Self::FLOOR
        } else {
            Self((20.0 * gain.log10()).max(MIN_DB))
        }
    }

    #[inline]
    pub fn to_gain(self) -> f32 {
        if self.0 <= MIN_DB {
            0.0
        } else {
            10.0_f32.powf(self.0 / 20.0)
        }
    }
}

impl Default for Decibels {
    fn default() -> Self {
        Self::ZERO
    }
}
