//! Real FFT with packed half-spectrum layout
//!
//! A real signal of `N` samples has a conjugate-symmetric spectrum, so bins
//! `0..=N/2` carry all information. The packed layout stores them in a single
//! real array of `N + 1` values:
//!
//! ```text
//! [ Re X0 .. Re X(h-1) | Im X0 (=0) .. Im X(h-1) | Re Xh ]     h = N/2
//! ```
//!
//! With this layout a complex multiply-accumulate of two spectra becomes four
//! real vector multiply-adds over the two halves plus one scalar Nyquist term
//! (see [`crate::convolver::convolve_accumulate`]).

use std::sync::Arc;

use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use bf_core::Sample;

/// Fixed-size real FFT operating on packed half-spectra
///
/// Cloning shares the FFT plans and allocates fresh work buffers, so each
/// execution context can own its own transform.
#[derive(Clone)]
pub struct SpectralTransform {
    size: usize,
    forward: Arc<dyn RealToComplex<Sample>>,
    inverse: Arc<dyn ComplexToReal<Sample>>,
    time: Vec<Sample>,
    spectrum: Vec<Complex<Sample>>,
    scratch: Vec<Complex<Sample>>,
}

impl SpectralTransform {
    /// Plan a transform of `size` samples (power of two, at least 4)
    pub fn new(size: usize) -> Self {
        assert!(
            size >= 4 && size.is_power_of_two(),
            "transform size must be a power of two >= 4, got {size}"
        );

        let mut planner = RealFftPlanner::<Sample>::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let scratch_len = forward
            .get_scratch_len()
            .max(inverse.get_scratch_len());

        Self {
            size,
            forward,
            inverse,
            time: vec![0.0; size],
            spectrum: vec![Complex::new(0.0, 0.0); size / 2 + 1],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
        }
    }

    /// Smallest transform that holds a linear convolution of two `fir_len` signals
    pub fn size_for_fir(fir_len: usize) -> usize {
        (2 * fir_len.max(2) - 1).next_power_of_two()
    }

    /// Transform size `N`
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Length of a packed spectrum (`N + 1`)
    #[inline]
    pub fn packed_len(&self) -> usize {
        self.size + 1
    }

    /// Forward transform of up to `N` samples (zero-padded) into `packed`
    pub fn forward(&mut self, samples: &[Sample], packed: &mut [Sample]) {
        assert!(samples.len() <= self.size, "input longer than transform");
        assert_eq!(packed.len(), self.packed_len(), "packed buffer must be N + 1");

        self.time[..samples.len()].copy_from_slice(samples);
        self.time[samples.len()..].fill(0.0);

        self.forward
            .process_with_scratch(&mut self.time, &mut self.spectrum, &mut self.scratch)
            .ok();

        pack_half_spectrum(&self.spectrum, packed);
    }

    /// Inverse transform of a packed spectrum into `N` time samples
    ///
    /// The result is normalized, so `inverse(forward(x)) == x`.
    pub fn inverse(&mut self, packed: &[Sample], output: &mut [Sample]) {
        assert_eq!(packed.len(), self.packed_len(), "packed buffer must be N + 1");
        assert_eq!(output.len(), self.size, "output must hold N samples");

        unpack_half_spectrum(packed, &mut self.spectrum);

        self.inverse
            .process_with_scratch(&mut self.spectrum, output, &mut self.scratch)
            .ok();

        let norm = 1.0 / self.size as Sample;
        for sample in output.iter_mut() {
            *sample *= norm;
        }
    }
}

impl std::fmt::Debug for SpectralTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralTransform")
            .field("size", &self.size)
            .finish()
    }
}

/// Pack bins `0..=N/2` into the `N + 1` real layout
pub fn pack_half_spectrum(spectrum: &[Complex<Sample>], packed: &mut [Sample]) {
    let half = (packed.len() - 1) / 2;
    assert_eq!(spectrum.len(), half + 1, "spectrum must hold N/2 + 1 bins");

    let (re, rest) = packed.split_at_mut(half);
    let (im, nyquist) = rest.split_at_mut(half);

    for ((r, i), bin) in re.iter_mut().zip(im.iter_mut()).zip(spectrum) {
        *r = bin.re;
        *i = bin.im;
    }
    // DC and Nyquist are purely real for real input
    im[0] = 0.0;
    nyquist[0] = spectrum[half].re;
}

/// Restore bins `0..=N/2` from the `N + 1` real layout
///
/// The inverse real FFT mirrors these bins into the conjugate-symmetric upper
/// half, which yields a real time signal.
pub fn unpack_half_spectrum(packed: &[Sample], spectrum: &mut [Complex<Sample>]) {
    let half = (packed.len() - 1) / 2;
    assert_eq!(spectrum.len(), half + 1, "spectrum must hold N/2 + 1 bins");

    let (re, rest) = packed.split_at(half);
    let (im, nyquist) = rest.split_at(half);

    for ((bin, &r), &i) in spectrum.iter_mut().zip(re).zip(im) {
        *bin = Complex::new(r, i);
    }
    spectrum[0].im = 0.0;
    spectrum[half] = Complex::new(nyquist[0], 0.0);
}
