//! Biquad filter implementation using Transposed Direct Form II
//!
//! TDF-II is numerically optimal for floating-point arithmetic,
//! minimizing quantization noise and ensuring stability. State is kept in
//! f64 even though samples are f32.

use std::f64::consts::PI;

use bf_core::Sample;

use crate::{MonoProcessor, Processor};

/// Biquad coefficients (normalized by a0)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Calculate bandpass filter coefficients (constant 0 dB peak gain)
    pub fn bandpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = alpha;
        let b1 = 0.0;
        let b2 = -alpha;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Bypass (unity gain, no filtering)
    pub fn bypass() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

/// Transposed Direct Form II biquad filter
#[derive(Debug, Clone)]
pub struct BiquadTdf2 {
    coeffs: BiquadCoeffs,
    z1: f64,
    z2: f64,
    sample_rate: f64,
}

impl BiquadTdf2 {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_coeffs(BiquadCoeffs::bypass(), sample_rate)
    }

    pub fn with_coeffs(coeffs: BiquadCoeffs, sample_rate: f64) -> Self {
        Self {
            coeffs,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
        }
    }

    /// Set as bandpass filter
    pub fn set_bandpass(&mut self, freq: f64, q: f64) {
        self.coeffs = BiquadCoeffs::bandpass(freq, q, self.sample_rate);
    }
}

impl Processor for BiquadTdf2 {
    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

impl MonoProcessor for BiquadTdf2 {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let input = input as f64;
        let output = self.coeffs.b0 * input + self.z1;
        self.z1 = self.coeffs.b1 * input - self.coeffs.a1 * output + self.z2;
        self.z2 = self.coeffs.b2 * input - self.coeffs.a2 * output;
        output as Sample
    }
}

// ============ Band-pass Prefilter ============

/// Highest usable centre frequency relative to the sample rate
const MAX_CENTER_RATIO: f64 = 0.45;

/// Per-microphone band-pass stage in front of the DOA analysis
///
/// Coefficients are computed in [`prepare`](Self::prepare) only; processing
/// never allocates.
#[derive(Debug, Clone)]
pub struct BandpassPrefilter {
    center_hz: f64,
    q: f64,
    filters: Vec<BiquadTdf2>,
}

impl BandpassPrefilter {
    pub fn new(center_hz: f64, q: f64) -> Self {
        Self {
            center_hz,
            q,
            filters: Vec::new(),
        }
    }

    /// Build one filter per channel for `sample_rate`
    pub fn prepare(&mut self, sample_rate: f64, channels: usize) {
        let max_center = sample_rate * MAX_CENTER_RATIO;
        let center = if self.center_hz > max_center {
            log::warn!(
                "Band-pass centre {:.0} Hz above {:.0} Hz at {sample_rate} Hz, clamping",
                self.center_hz,
                max_center
            );
            max_center
        } else {
            self.center_hz
        };

        let coeffs = BiquadCoeffs::bandpass(center, self.q, sample_rate);
        self.filters = vec![BiquadTdf2::with_coeffs(coeffs, sample_rate); channels];
    }

    /// Filter one channel's block in place
    #[inline]
    pub fn process(&mut self, channel: usize, buffer: &mut [Sample]) {
        self.filters[channel].process_block(buffer);
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.filters.len()
    }

    pub fn center_hz(&self) -> f64 {
        self.center_hz
    }

    pub fn q(&self) -> f64 {
        self.q
    }
}

impl Processor for BandpassPrefilter {
    fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sample_rate: f64, len: usize) -> Vec<Sample> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate).sin() as Sample)
            .collect()
    }

    fn rms(signal: &[Sample]) -> f64 {
        let sum: f64 = signal.iter().map(|&x| (x as f64) * (x as f64)).sum();
        (sum / signal.len() as f64).sqrt()
    }

    #[test]
    fn test_bypass() {
        let mut filter = BiquadTdf2::new(48000.0);
        let output = filter.process_sample(0.5);
        assert!((output - 0.5).abs() < 1e-7);
    }

    #[test]
    fn test_bandpass_blocks_dc() {
        let mut filter = BiquadTdf2::new(48000.0);
        filter.set_bandpass(2000.0, 1.0);
        for _ in 0..2000 {
            filter.process_sample(1.0);
        }
        assert!(filter.process_sample(1.0).abs() < 1e-3);
    }

    #[test]
    fn test_prefilter_passes_center() {
        let mut prefilter = BandpassPrefilter::new(2000.0, 1.0);
        prefilter.prepare(48000.0, 2);

        let mut center = sine(2000.0, 48000.0, 9600);
        let mut low = sine(100.0, 48000.0, 9600);
        prefilter.process(0, &mut center);
        prefilter.process(1, &mut low);

        // Skip the transient
        let center_rms = rms(&center[4800..]);
        let low_rms = rms(&low[4800..]);
        assert!((center_rms - 0.7071).abs() < 0.02, "centre rms {center_rms}");
        assert!(low_rms < 0.1, "100 Hz leaked: {low_rms}");
    }

    #[test]
    fn test_prefilter_channels_independent() {
        let mut prefilter = BandpassPrefilter::new(2000.0, 1.0);
        prefilter.prepare(48000.0, 2);
        let mut a = vec![1.0, 0.0, 0.0, 0.0];
        let mut b = vec![0.0; 4];
        prefilter.process(0, &mut a);
        prefilter.process(1, &mut b);
        assert!(b.iter().all(|&s| s == 0.0));
        assert!(a[0] != 0.0);
    }

    #[test]
    fn test_prefilter_reset() {
        let mut prefilter = BandpassPrefilter::new(2000.0, 1.0);
        prefilter.prepare(48000.0, 1);
        let mut first = vec![1.0, 0.0, 0.0, 0.0];
        prefilter.process(0, &mut first);
        prefilter.reset();
        let mut second = vec![1.0, 0.0, 0.0, 0.0];
        prefilter.process(0, &mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn test_prefilter_clamps_center() {
        let mut prefilter = BandpassPrefilter::new(30000.0, 1.0);
        prefilter.prepare(16000.0, 1);
        let mut block = sine(7000.0, 16000.0, 256);
        prefilter.process(0, &mut block);
        assert!(block.iter().all(|s| s.is_finite()));
    }
}
