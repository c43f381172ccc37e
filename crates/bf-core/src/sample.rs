//! Sample types and multichannel buffer definitions

use crate::{BfError, BfResult};

/// Type alias for audio samples
pub type Sample = f32;

/// Allocate `len` copies of `value`, reporting allocation failure instead of aborting
pub fn try_filled(len: usize, value: Sample) -> BfResult<Vec<Sample>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len)
        .map_err(|e| BfError::Allocation(format!("{len} samples: {e}")))?;
    data.resize(len, value);
    Ok(data)
}

/// Allocate a zeroed buffer, reporting allocation failure instead of aborting
#[inline]
pub fn try_zeroed(len: usize) -> BfResult<Vec<Sample>> {
    try_filled(len, 0.0)
}

/// Planar multichannel audio buffer
///
/// Channels are stored back to back in one allocation, so a channel is always a
/// contiguous slice of `num_samples` samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelBuffer {
    data: Vec<Sample>,
    channels: usize,
    samples: usize,
}

impl ChannelBuffer {
    /// Create a zeroed buffer
    pub fn new(channels: usize, samples: usize) -> Self {
        Self {
            data: vec![0.0; channels * samples],
            channels,
            samples,
        }
    }

    /// Create a zeroed buffer, reporting allocation failure instead of aborting
    pub fn try_new(channels: usize, samples: usize) -> BfResult<Self> {
        let len = channels
            .checked_mul(samples)
            .ok_or_else(|| BfError::Allocation(format!("{channels}x{samples} overflows")))?;
        Ok(Self {
            data: try_zeroed(len)?,
            channels,
            samples,
        })
    }

    /// Build from one vector per channel (all channels must share a length)
    pub fn from_channels(channels: &[Vec<Sample>]) -> Self {
        let samples = channels.first().map_or(0, Vec::len);
        assert!(
            channels.iter().all(|c| c.len() == samples),
            "all channels must have the same length"
        );
        let mut data = Vec::with_capacity(channels.len() * samples);
        for channel in channels {
            data.extend_from_slice(channel);
        }
        Self {
            data,
            channels: channels.len(),
            samples,
        }
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn num_samples(&self) -> usize {
        self.samples
    }

    #[inline]
    pub fn channel(&self, index: usize) -> &[Sample] {
        assert!(index < self.channels, "channel {index} out of range");
        &self.data[index * self.samples..(index + 1) * self.samples]
    }

    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [Sample] {
        assert!(index < self.channels, "channel {index} out of range");
        &mut self.data[index * self.samples..(index + 1) * self.samples]
    }

    /// All channels back to back
    #[inline]
    pub fn as_slice(&self) -> &[Sample] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [Sample] {
        &mut self.data
    }

    /// Iterate over channels as slices
    pub fn channels(&self) -> impl Iterator<Item = &[Sample]> {
        (0..self.channels).map(move |i| self.channel(i))
    }

    /// Iterate mutably over channels as slices
    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [Sample]> {
        let channels = self.channels;
        self.data.chunks_exact_mut(self.samples.max(1)).take(channels)
    }

    /// Change the shape, zeroing the contents
    pub fn resize(&mut self, channels: usize, samples: usize) {
        self.data.clear();
        self.data.resize(channels * samples, 0.0);
        self.channels = channels;
        self.samples = samples;
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Multiply every sample by `gain`
    pub fn apply_gain(&mut self, gain: Sample) {
        for sample in &mut self.data {
            *sample *= gain;
        }
    }

    /// Sum of all samples in a channel, used as a cheap checksum
    pub fn channel_sum(&self, index: usize) -> f64 {
        self.channel(index).iter().map(|&s| s as f64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_layout() {
        let mut buffer = ChannelBuffer::new(3, 4);
        buffer.channel_mut(1)[2] = 1.5;
        assert_eq!(buffer.channel(1), &[0.0, 0.0, 1.5, 0.0]);
        assert_eq!(buffer.channel(0), &[0.0; 4]);
        assert_eq!(buffer.channels().count(), 3);
    }

    #[test]
    fn test_from_channels() {
        let buffer = ChannelBuffer::from_channels(&[vec![1.0, 2.0], vec![3.0, 4.0]]);
        assert_eq!(buffer.num_channels(), 2);
        assert_eq!(buffer.num_samples(), 2);
        assert_eq!(buffer.channel(1), &[3.0, 4.0]);
        assert_eq!(buffer.channel_sum(0), 3.0);
    }

    #[test]
    fn test_try_new_overflow() {
        assert!(matches!(
            ChannelBuffer::try_new(usize::MAX, 2),
            Err(BfError::Allocation(_))
        ));
    }

    #[test]
    fn test_fallible_fill() {
        assert_eq!(try_filled(3, -100.0).unwrap(), vec![-100.0; 3]);
        assert!(try_zeroed(0).unwrap().is_empty());
        assert!(matches!(try_zeroed(usize::MAX), Err(BfError::Allocation(_))));
    }

    #[test]
    fn test_empty_channels_iterate() {
        let buffer = ChannelBuffer::new(2, 0);
        assert_eq!(buffer.channels().count(), 2);
        assert_eq!(buffer.channel(1).len(), 0);
    }

    #[test]
    #[should_panic]
    fn test_channel_out_of_range() {
        let buffer = ChannelBuffer::new(2, 4);
        let _ = buffer.channel(2);
    }
}
