//! Overlap-Add Block Convolution
//!
//! Convolution runs on packed half-spectra (see [`crate::spectral`]):
//! - `convolve_accumulate` multiplies two packed spectra and adds the product
//!   into an accumulator using real arithmetic only
//! - `OverlapAddConvolver::finish` turns an accumulated spectrum back into time
//!   samples
//! - `OverlapAddBuffer` sums consecutive block results and hands out the
//!   completed front of the stream

use bf_core::{BfResult, Sample, try_zeroed};

use crate::spectral::SpectralTransform;

// ============ Packed Multiply-Accumulate ============

/// `output += input * filter` on packed half-spectra of equal length `N + 1`
///
/// With `a = re + j·im` from `input` and `b` from `filter`:
/// `Re += a.re·b.re - a.im·b.im`, `Im += a.re·b.im + a.im·b.re`, and the purely
/// real Nyquist bins are multiplied separately. The loops carry no branches so
/// the compiler can vectorize them.
#[inline]
pub fn convolve_accumulate(input: &[Sample], filter: &[Sample], output: &mut [Sample]) {
    assert_eq!(input.len(), output.len(), "input/output length mismatch");
    assert_eq!(filter.len(), output.len(), "filter/output length mismatch");

    let half = (output.len() - 1) / 2;

    let (in_re, rest) = input.split_at(half);
    let (in_im, in_nyq) = rest.split_at(half);
    let (ir_re, rest) = filter.split_at(half);
    let (ir_im, ir_nyq) = rest.split_at(half);
    let (out_re, rest) = output.split_at_mut(half);
    let (out_im, out_nyq) = rest.split_at_mut(half);

    for (o, (a, b)) in out_re.iter_mut().zip(in_re.iter().zip(ir_re)) {
        *o += a * b;
    }
    for (o, (a, b)) in out_re.iter_mut().zip(in_im.iter().zip(ir_im)) {
        *o -= a * b;
    }
    for (o, (a, b)) in out_im.iter_mut().zip(in_re.iter().zip(ir_im)) {
        *o += a * b;
    }
    for (o, (a, b)) in out_im.iter_mut().zip(in_im.iter().zip(ir_re)) {
        *o += a * b;
    }

    out_nyq[0] += in_nyq[0] * ir_nyq[0];
}

// ============ Convolver ============

/// Forward/inverse transform pair around the packed multiply-accumulate
#[derive(Debug, Clone)]
pub struct OverlapAddConvolver {
    transform: SpectralTransform,
    time: Vec<Sample>,
}

impl OverlapAddConvolver {
    pub fn new(transform: SpectralTransform) -> Self {
        let size = transform.size();
        Self {
            transform,
            time: vec![0.0; size],
        }
    }

    #[inline]
    pub fn fft_size(&self) -> usize {
        self.transform.size()
    }

    #[inline]
    pub fn packed_len(&self) -> usize {
        self.transform.packed_len()
    }

    /// Longest input block whose convolution with `fir_len` taps fits one transform
    #[inline]
    pub fn max_block_len(&self, fir_len: usize) -> usize {
        assert!(fir_len >= 1 && fir_len <= self.fft_size(), "FIR does not fit transform");
        self.fft_size() - fir_len + 1
    }

    /// Forward transform of an input block into a packed spectrum
    #[inline]
    pub fn analyze(&mut self, samples: &[Sample], packed: &mut [Sample]) {
        self.transform.forward(samples, packed);
    }

    /// Inverse transform of an accumulated spectrum, returning `N` samples
    pub fn finish(&mut self, spectrum: &[Sample]) -> &[Sample] {
        self.transform.inverse(spectrum, &mut self.time);
        &self.time
    }
}

// ============ Overlap-Add Buffer ============

/// Sliding accumulator for overlap-add output
///
/// Block results are added at their offset into the current window; the tail
/// spills into the next window. `drain_into` hands the front to the caller,
/// shifts the remainder left and zeroes the freed tail.
#[derive(Debug, Clone, Default)]
pub struct OverlapAddBuffer {
    data: Vec<Sample>,
}

impl OverlapAddBuffer {
    pub fn try_new(len: usize) -> BfResult<Self> {
        Ok(Self {
            data: try_zeroed(len)?,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[Sample] {
        &self.data
    }

    /// Add `samples * gain` starting at `offset`
    #[inline]
    pub fn add(&mut self, offset: usize, samples: &[Sample], gain: Sample) {
        let end = offset + samples.len();
        assert!(end <= self.data.len(), "overlap-add past end of buffer");
        for (acc, &s) in self.data[offset..end].iter_mut().zip(samples) {
            *acc += s * gain;
        }
    }

    /// Copy the first `out.len()` samples out and slide the window
    pub fn drain_into(&mut self, out: &mut [Sample]) {
        let consumed = out.len();
        assert!(consumed <= self.data.len(), "drain longer than buffer");

        out.copy_from_slice(&self.data[..consumed]);
        self.data.copy_within(consumed.., 0);
        let len = self.data.len();
        self.data[len - consumed..].fill(0.0);
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }
}

// ============ Tests ============
