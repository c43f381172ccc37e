//! Multichannel ring of recent band-passed input for the DOA path

use bf_core::{BfResult, ChannelBuffer, Sample, try_zeroed};

/// Fixed-capacity planar ring buffer
///
/// The audio thread appends every block; the DOA side copies the most recent
/// `window` samples per channel in chronological order.
#[derive(Debug, Clone)]
pub struct DoaInputRing {
    /// `[channel][capacity]` flattened
    data: Vec<Sample>,
    channels: usize,
    capacity: usize,
    write_pos: usize,
    /// Samples written so far, saturating at `capacity`
    filled: usize,
}

impl DoaInputRing {
    pub fn try_new(channels: usize, capacity: usize) -> BfResult<Self> {
        assert!(capacity > 0, "ring capacity must be positive");
        let len = channels * capacity;
        let data = try_zeroed(len)?;

        Ok(Self {
            data,
            channels,
            capacity,
            write_pos: 0,
            filled: 0,
        })
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples of history available per channel
    #[inline]
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Append one block; only the last `capacity` samples of a longer block are kept
    pub fn write(&mut self, block: &ChannelBuffer, len: usize) {
        assert_eq!(block.num_channels(), self.channels, "ring channel mismatch");
        assert!(len <= block.num_samples(), "write past end of block");

        let skip = len.saturating_sub(self.capacity);
        let count = len - skip;
        let first = count.min(self.capacity - self.write_pos);

        for (ring, input) in self.data.chunks_exact_mut(self.capacity).zip(block.channels()) {
            let input = &input[skip..len];
            ring[self.write_pos..self.write_pos + first].copy_from_slice(&input[..first]);
            ring[..count - first].copy_from_slice(&input[first..]);
        }

        self.write_pos = (self.write_pos + count) % self.capacity;
        self.filled = (self.filled + count).min(self.capacity);
    }

    /// Copy the latest `window` samples of every channel, oldest first
    ///
    /// `out` is planar `[channel][window]`. Missing history reads as zeros.
    pub fn read_latest(&self, window: usize, out: &mut [Sample]) {
        assert!(window <= self.capacity, "window larger than ring");
        assert_eq!(out.len(), self.channels * window, "snapshot buffer size mismatch");

        let start = (self.write_pos + self.capacity - window) % self.capacity;
        let first = window.min(self.capacity - start);

        for (ring, dst) in self
            .data
            .chunks_exact(self.capacity)
            .zip(out.chunks_exact_mut(window))
        {
            dst[..first].copy_from_slice(&ring[start..start + first]);
            dst[first..].copy_from_slice(&ring[..window - first]);
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.write_pos = 0;
        self.filled = 0;
    }
}
