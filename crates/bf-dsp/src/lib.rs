//! bf-dsp: DSP building blocks for the beamforming engine
//!
//! ## Modules
//! - `spectral` - Real FFT wrapper with packed half-spectrum layout
//! - `filter_bank` - Frequency-domain FIR banks built from impulse-response tables
//! - `convolver` - Packed multiply-accumulate, inverse transform and overlap-add
//! - `smoothing` - Block-rate exponential FIR interpolation
//! - `biquad` - TDF-II biquad and the per-microphone band-pass prefilter

pub mod biquad;
pub mod convolver;
pub mod filter_bank;
pub mod smoothing;
pub mod spectral;

pub use biquad::{BandpassPrefilter, BiquadCoeffs, BiquadTdf2};
pub use convolver::{OverlapAddBuffer, OverlapAddConvolver, convolve_accumulate};
pub use filter_bank::{FirFilterBank, ImpulseResponseTable};
pub use smoothing::{FirInterpolation, block_alpha};
pub use spectral::SpectralTransform;

use bf_core::Sample;

/// Trait for all DSP processors
pub trait Processor: Send + Sync {
    /// Reset processor state
    fn reset(&mut self);
}

/// Mono processor trait
pub trait MonoProcessor: Processor {
    /// Process a single sample
    fn process_sample(&mut self, input: Sample) -> Sample;

    /// Process a block of samples in place
    fn process_block(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}
