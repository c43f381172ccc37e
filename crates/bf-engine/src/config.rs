//! Engine configuration (JSON via serde)

use serde::{Deserialize, Serialize};

use bf_core::{BfError, BfResult};
use bf_dsp::block_alpha;

use crate::mixer::PanLaw;

/// Slowest accepted DOA refresh rate (one cycle every 100 s)
pub const MIN_DOA_UPDATE_HZ: f64 = 0.01;

/// How fast beam FIRs follow a steering change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirSmoothing {
    /// α derived from block length and sample rate
    TimeConstant { seconds: f64 },
    /// Same α for every block regardless of its length
    Fixed { alpha: f32 },
}

impl FirSmoothing {
    /// Interpolation coefficient for a block of `block_len` samples
    #[inline]
    pub fn alpha(self, block_len: usize, sample_rate: f64) -> f32 {
        match self {
            FirSmoothing::TimeConstant { seconds } => block_alpha(block_len, sample_rate, seconds),
            FirSmoothing::Fixed { alpha } => alpha,
        }
    }
}

impl Default for FirSmoothing {
    fn default() -> Self {
        FirSmoothing::TimeConstant { seconds: 0.2 }
    }
}

/// Band-pass stage in front of the DOA analysis
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefilterConfig {
    pub center_hz: f64,
    pub q: f64,
}

impl Default for PrefilterConfig {
    fn default() -> Self {
        Self {
            center_hz: 2000.0,
            q: 1.0,
        }
    }
}

/// Beamformer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of output beams
    pub num_beams: usize,

    /// FIR transition smoothing
    pub fir_smoothing: FirSmoothing,

    /// DOA refresh rate; 0 disables the background worker
    pub doa_update_hz: f64,

    /// DOA band-pass prefilter
    pub doa_prefilter: PrefilterConfig,

    /// Pan law for the stereo fold-down
    pub pan_law: PanLaw,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_beams: 2,
            fir_smoothing: FirSmoothing::default(),
            doa_update_hz: 10.0,
            doa_prefilter: PrefilterConfig::default(),
            pan_law: PanLaw::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> BfResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| BfError::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> BfResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| BfError::Serialization(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> BfResult<()> {
        if self.num_beams == 0 {
            return Err(BfError::InvalidParam("num_beams must be at least 1".into()));
        }
        match self.fir_smoothing {
            FirSmoothing::TimeConstant { seconds } if !(seconds >= 0.0 && seconds.is_finite()) => {
                return Err(BfError::InvalidParam(format!(
                    "FIR time constant must be >= 0, got {seconds}"
                )));
            }
            FirSmoothing::Fixed { alpha } if !(0.0..=1.0).contains(&alpha) => {
                return Err(BfError::InvalidParam(format!(
                    "FIR alpha must be in [0, 1], got {alpha}"
                )));
            }
            _ => {}
        }
        let hz = self.doa_update_hz;
        if !(hz == 0.0 || (hz >= MIN_DOA_UPDATE_HZ && hz.is_finite())) {
            return Err(BfError::InvalidParam(format!(
                "doa_update_hz must be 0 or in [{MIN_DOA_UPDATE_HZ}, inf), got {hz}"
            )));
        }
        if !(self.doa_prefilter.center_hz > 0.0 && self.doa_prefilter.q > 0.0) {
            return Err(BfError::InvalidParam(
                "prefilter centre and Q must be positive".into(),
            ));
        }
        Ok(())
    }
}
