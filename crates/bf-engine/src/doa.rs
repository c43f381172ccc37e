//! Direction-of-arrival energy estimation
//!
//! The audio thread pushes band-passed input into a shared ring. A background
//! worker wakes periodically, copies the latest analysis window, runs it
//! through the DOA filter bank (one delay-and-sum look direction per grid
//! cell) and publishes the output level of every cell in dB.
//!
//! Two locks cross the thread boundary, one around the ring and one around the
//! published profile. Both are held only while copying; transforms and
//! convolution run on the worker's private buffers.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Sender, bounded, select, tick};
use parking_lot::Mutex;

use bf_core::{
    BfError, BfResult, ChannelBuffer, Decibels, MIN_DB, Sample, try_filled, try_zeroed,
};
use bf_dsp::{FirFilterBank, OverlapAddConvolver, SpectralTransform, convolve_accumulate};

use crate::snapshot::DoaInputRing;

// ============ Shared State ============

/// State shared between the audio thread, the DOA worker and probes
#[derive(Debug)]
pub(crate) struct DoaShared {
    ring: Mutex<DoaInputRing>,
    profile: Mutex<Vec<Sample>>,
    window: usize,
    channels: usize,
    cells: usize,
}

impl DoaShared {
    pub(crate) fn try_new(channels: usize, window: usize, cells: usize) -> BfResult<Self> {
        let ring = DoaInputRing::try_new(channels, window)?;
        assert!(ring.capacity() >= window, "DOA ring shorter than analysis window");

        let profile = try_filled(cells, MIN_DB)?;

        Ok(Self {
            ring: Mutex::new(ring),
            profile: Mutex::new(profile),
            window,
            channels,
            cells,
        })
    }

    /// Append the first `len` samples of a band-passed block
    #[inline]
    pub(crate) fn push(&self, block: &ChannelBuffer, len: usize) {
        self.ring.lock().write(block, len);
    }

    /// Copy the latest window; false while history is shorter than a window
    fn snapshot(&self, out: &mut [Sample]) -> bool {
        let ring = self.ring.lock();
        ring.read_latest(self.window, out);
        ring.filled() >= self.window
    }

    fn publish(&self, energy: &[Sample]) {
        assert_eq!(energy.len(), self.cells, "DOA profile length mismatch");
        self.profile.lock().copy_from_slice(energy);
    }

    fn read_profile(&self, out: &mut [Sample]) {
        assert_eq!(out.len(), self.cells, "DOA profile length mismatch");
        out.copy_from_slice(&self.profile.lock());
    }

    pub(crate) fn clear(&self) {
        self.ring.lock().clear();
        self.profile.lock().fill(MIN_DB);
    }
}

// ============ Estimator ============

/// One DOA analysis pipeline with private working buffers
pub struct DoaEstimator {
    shared: Arc<DoaShared>,
    bank: Arc<FirFilterBank>,
    convolver: OverlapAddConvolver,
    /// Snapshot, `[channel][window]`
    window: Vec<Sample>,
    /// Input spectra, `[channel][packed_len]`
    spectra: Vec<Sample>,
    accumulator: Vec<Sample>,
    energy: Vec<Sample>,
}

impl DoaEstimator {
    pub(crate) fn try_new(
        shared: Arc<DoaShared>,
        bank: Arc<FirFilterBank>,
        transform: SpectralTransform,
    ) -> BfResult<Self> {
        assert_eq!(bank.num_channels(), shared.channels, "DOA bank channel mismatch");
        assert_eq!(bank.num_entries(), shared.cells, "DOA bank does not match grid");

        let convolver = OverlapAddConvolver::new(transform);
        let packed_len = convolver.packed_len();

        Ok(Self {
            window: try_zeroed(shared.channels * shared.window)?,
            spectra: try_zeroed(shared.channels * packed_len)?,
            accumulator: try_zeroed(packed_len)?,
            energy: try_zeroed(shared.cells)?,
            shared,
            bank,
            convolver,
        })
    }

    /// Samples per channel analysed each cycle
    #[inline]
    pub fn window_len(&self) -> usize {
        self.shared.window
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        self.shared.cells
    }

    /// Run one analysis cycle
    ///
    /// Returns false and keeps the previous profile while the ring holds less
    /// than one window of history.
    pub fn run_cycle(&mut self) -> bool {
        if !self.shared.snapshot(&mut self.window) {
            log::debug!(
                "DOA cycle skipped: input history shorter than {} samples",
                self.shared.window
            );
            return false;
        }

        let window = self.shared.window;
        let packed_len = self.convolver.packed_len();
        for (samples, spectrum) in self
            .window
            .chunks_exact(window)
            .zip(self.spectra.chunks_exact_mut(packed_len))
        {
            self.convolver.analyze(samples, spectrum);
        }

        for (cell, level) in self.energy.iter_mut().enumerate() {
            self.accumulator.fill(0.0);
            for (channel, spectrum) in self.spectra.chunks_exact(packed_len).enumerate() {
                convolve_accumulate(spectrum, self.bank.get(cell, channel), &mut self.accumulator);
            }

            let output = self.convolver.finish(&self.accumulator);
            let power: f64 = output.iter().map(|&s| (s as f64) * (s as f64)).sum();
            let rms = (power / output.len() as f64).sqrt();
            *level = Decibels::from_gain(rms as f32).0;
        }

        self.shared.publish(&self.energy);
        true
    }
}

// ============ Worker ============

/// Background thread running [`DoaEstimator::run_cycle`] at a fixed period
pub struct DoaWorker {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl DoaWorker {
    pub fn spawn(mut estimator: DoaEstimator, period: Duration) -> BfResult<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("bf-doa".into())
            .spawn(move || {
                // Ticks are scheduled from spawn time, so cycle cost does not shift the rate
                let ticker = tick(period);
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            estimator.run_cycle();
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
                log::info!("DOA worker exiting");
            })
            .map_err(|e| BfError::Thread(format!("failed to spawn DOA worker: {e}")))?;

        log::info!("DOA worker started, period {period:?}");
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait for it; repeatable
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("DOA worker panicked");
            }
        }
    }
}

impl Drop for DoaWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

// ============ Probe ============

/// Thread-safe diagnostic handle onto the DOA state
#[derive(Debug, Clone)]
pub struct DoaProbe {
    shared: Arc<DoaShared>,
}

impl DoaProbe {
    pub(crate) fn new(shared: Arc<DoaShared>) -> Self {
        Self { shared }
    }

    /// Samples per channel in an analysis window
    #[inline]
    pub fn window_len(&self) -> usize {
        self.shared.window
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.shared.channels
    }

    /// DOA grid cells in the profile
    #[inline]
    pub fn num_cells(&self) -> usize {
        self.shared.cells
    }

    /// Whether a full window of input has been captured
    pub fn has_full_window(&self) -> bool {
        self.shared.ring.lock().filled() >= self.shared.window
    }

    /// Copy the latest band-passed input window into `out` (channels x window)
    pub fn doa_input_buffer(&self, out: &mut ChannelBuffer) {
        assert_eq!(out.num_channels(), self.shared.channels, "snapshot channel mismatch");
        assert_eq!(out.num_samples(), self.shared.window, "snapshot length mismatch");
        self.shared.snapshot(out.as_mut_slice());
    }

    /// Copy the latest energy profile in dB, row-major
    pub fn doa_energy(&self, out: &mut [Sample]) {
        self.shared.read_profile(out);
    }

    /// Overwrite the published profile
    pub fn set_doa_energy(&self, energy: &[Sample]) {
        self.shared.publish(energy);
    }
}
