//! Block-rate FIR interpolation
//!
//! Beam steering changes swap the whole FIR set, which clicks if done at once.
//! Each beam instead keeps an effective packed FIR per microphone and moves it
//! toward the selected filter-bank entry once per audio block:
//!
//! `current = α·target + (1 - α)·current`
//!
//! The FFT is linear, so blending packed spectra is the same as blending the
//! time-domain taps.

use bf_core::{BfResult, Sample, try_zeroed};

use crate::filter_bank::FirFilterBank;

/// Exponential smoothing coefficient for one block
///
/// Reaches ~63% of a step after `time_constant_s` seconds of audio. A
/// non-positive time constant means an immediate update (α = 1).
pub fn block_alpha(block_len: usize, sample_rate: f64, time_constant_s: f64) -> f32 {
    if time_constant_s <= 0.0 || sample_rate <= 0.0 {
        1.0
    } else {
        let block_s = block_len as f64 / sample_rate;
        (1.0 - (-block_s / time_constant_s).exp()) as f32
    }
}

/// Effective FIR of one beam and the bank entry it is moving toward
#[derive(Debug, Clone)]
pub struct FirInterpolation {
    /// Packed spectra, `[channel][packed_len]` flattened
    current: Vec<Sample>,
    target: usize,
    channels: usize,
    packed_len: usize,
}

impl FirInterpolation {
    /// Start at `target` with no transition (α = 1)
    pub fn try_new(bank: &FirFilterBank, target: usize) -> BfResult<Self> {
        let channels = bank.num_channels();
        let packed_len = bank.packed_len();
        let len = channels * packed_len;

        let current = try_zeroed(len)?;

        let mut state = Self {
            current,
            target,
            channels,
            packed_len,
        };
        state.snap(bank);
        Ok(state)
    }

    /// Bank entry being approached
    #[inline]
    pub fn target(&self) -> usize {
        self.target
    }

    /// Select a new target; the effective FIR follows on `advance`
    #[inline]
    pub fn set_target(&mut self, index: usize) {
        self.target = index;
    }

    /// Jump straight to the target
    pub fn snap(&mut self, bank: &FirFilterBank) {
        for (channel, slot) in self.current.chunks_exact_mut(self.packed_len).enumerate() {
            slot.copy_from_slice(bank.get(self.target, channel));
        }
    }

    /// One block of exponential blending toward the target
    pub fn advance(&mut self, bank: &FirFilterBank, alpha: f32) {
        if alpha >= 1.0 {
            self.snap(bank);
            return;
        }
        let keep = 1.0 - alpha;
        for (channel, slot) in self.current.chunks_exact_mut(self.packed_len).enumerate() {
            for (c, &t) in slot.iter_mut().zip(bank.get(self.target, channel)) {
                *c = alpha * t + keep * *c;
            }
        }
    }

    /// Effective packed FIR of `channel`
    #[inline]
    pub fn current(&self, channel: usize) -> &[Sample] {
        assert!(channel < self.channels, "channel {channel} out of range");
        &self.current[channel * self.packed_len..(channel + 1) * self.packed_len]
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels
    }

    /// Euclidean distance between the effective FIR and the target entry
    pub fn distance(&self, bank: &FirFilterBank) -> f32 {
        let sum: f64 = (0..self.channels)
            .map(|channel| {
                self.current(channel)
                    .iter()
                    .zip(bank.get(self.target, channel))
                    .map(|(&c, &t)| {
                        let d = (c - t) as f64;
                        d * d
                    })
                    .sum::<f64>()
            })
            .sum();
        sum.sqrt() as f32
    }
}
