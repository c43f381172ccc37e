//! Beamformer
//!
//! Lifecycle:
//!
//! ```text
//! Uninitialized --set_mic_config--> Configured --prepare_to_play--> Ready
//!                                        ^                            |
//!                                        +----release_resources-------+
//! ```
//!
//! Per block (`process_block`):
//! 1. Band-pass the input into the DOA ring
//! 2. Move every beam's effective FIR one step toward its target entry
//! 3. Per sub-block: transform each microphone once, multiply-accumulate the
//!    spectra into every beam, inverse transform and overlap-add
//!
//! `get_beams` then drains one block per beam from the overlap-add buffers.
//! Neither call allocates, locks anything but the DOA ring, or returns errors.

use std::sync::Arc;
use std::time::Duration;

use bf_core::{
    BeamParameters, BfError, BfResult, ChannelBuffer, MicArrayConfig, Sample, try_zeroed,
};
use bf_dsp::{
    BandpassPrefilter, FirFilterBank, FirInterpolation, OverlapAddBuffer, OverlapAddConvolver,
    Processor, SpectralTransform, convolve_accumulate,
};

use crate::config::{EngineConfig, PrefilterConfig};
use crate::doa::{DoaEstimator, DoaProbe, DoaShared, DoaWorker};
use crate::tables::{FirLibrary, SteeringGrid};

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Configured,
    Ready,
}

/// Filter banks for the configured layout
struct ArraySetup {
    mic_config: MicArrayConfig,
    grid: SteeringGrid,
    beam_bank: Arc<FirFilterBank>,
    doa_bank: Arc<FirFilterBank>,
    transform: SpectralTransform,
}

/// Per-beam audio state
struct BeamState {
    fir: FirInterpolation,
    ola: OverlapAddBuffer,
}

/// Block-size dependent buffers, owned by the audio thread
struct Prepared {
    sample_rate: f64,
    max_block: usize,
    convolver: OverlapAddConvolver,
    beams: Vec<BeamState>,
    /// Input spectra of the current sub-block, `[mic][packed_len]`
    spectra: Vec<Sample>,
    accumulator: Vec<Sample>,
    /// Gain-scaled sub-block of one microphone
    scaled: Vec<Sample>,
    prefilter: BandpassPrefilter,
    /// Band-passed copy of the input block
    doa_block: ChannelBuffer,
    doa: Arc<DoaShared>,
    worker: Option<DoaWorker>,
}

/// Multi-beam frequency-domain beamformer
pub struct Beamformer {
    config: EngineConfig,
    library: Arc<dyn FirLibrary>,
    params: Vec<BeamParameters>,
    bypass: bool,
    pass_through: bool,
    array: Option<ArraySetup>,
    prepared: Option<Prepared>,
}

impl Beamformer {
    pub fn new(config: EngineConfig, library: Arc<dyn FirLibrary>) -> BfResult<Self> {
        config.validate()?;
        Ok(Self {
            params: vec![BeamParameters::default(); config.num_beams],
            config,
            library,
            bypass: false,
            pass_through: false,
            array: None,
            prepared: None,
        })
    }

    pub fn state(&self) -> EngineState {
        match (&self.array, &self.prepared) {
            (None, _) => EngineState::Uninitialized,
            (Some(_), None) => EngineState::Configured,
            (Some(_), Some(_)) => EngineState::Ready,
        }
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn num_beams(&self) -> usize {
        self.params.len()
    }

    pub fn mic_config(&self) -> Option<MicArrayConfig> {
        self.array.as_ref().map(|a| a.mic_config)
    }

    /// Microphone channels expected by `process_block`
    pub fn num_channels(&self) -> Option<usize> {
        self.mic_config().map(MicArrayConfig::num_mics)
    }

    pub fn steering_grid(&self) -> Option<SteeringGrid> {
        self.array.as_ref().map(|a| a.grid)
    }

    /// Transform size shared by beam and DOA paths
    pub fn fft_size(&self) -> Option<usize> {
        self.array.as_ref().map(|a| a.transform.size())
    }

    /// Taps of the beam filters
    pub fn fir_len(&self) -> Option<usize> {
        self.array.as_ref().map(|a| a.beam_bank.fir_len())
    }

    /// Samples per channel analysed by each DOA cycle
    pub fn doa_window_len(&self) -> Option<usize> {
        self.array
            .as_ref()
            .map(|a| a.transform.size() - a.doa_bank.fir_len() + 1)
    }

    /// Added delay of the block processing itself
    pub fn latency_samples(&self) -> usize {
        0
    }

    // ============ Lifecycle ============

    /// Select the microphone layout and build its filter banks
    ///
    /// A prepared engine is released back to Configured. On error the
    /// previous configuration is left untouched.
    pub fn set_mic_config(&mut self, mic_config: MicArrayConfig) -> BfResult<()> {
        let tables = self.library.tables(mic_config)?;
        tables.validate_for(mic_config)?;

        let fft_size = SpectralTransform::size_for_fir(tables.max_fir_len());
        let mut transform = SpectralTransform::new(fft_size);
        let beam_bank = FirFilterBank::build(&mut transform, tables.beam.clone())?;
        let doa_bank = FirFilterBank::build(&mut transform, tables.doa.clone())?;

        self.release_resources();
        self.array = Some(ArraySetup {
            mic_config,
            grid: tables.grid,
            beam_bank: Arc::new(beam_bank),
            doa_bank: Arc::new(doa_bank),
            transform,
        });

        log::info!(
            "Mic config {mic_config:?}: {} mics, {} beam entries, {} DOA cells, FFT {fft_size}",
            mic_config.num_mics(),
            tables.grid.len(),
            tables.doa.num_entries()
        );
        Ok(())
    }

    /// Allocate every block-size dependent buffer and start the DOA worker
    ///
    /// Calling it again re-initializes from scratch.
    pub fn prepare_to_play(&mut self, sample_rate: f64, max_block: usize) -> BfResult<()> {
        if !(sample_rate > 0.0 && sample_rate.is_finite()) {
            return Err(BfError::InvalidSampleRate(sample_rate));
        }
        if max_block == 0 {
            return Err(BfError::InvalidParam("max block size must be positive".into()));
        }
        self.release_resources();
        let Some(array) = self.array.as_ref() else {
            return Err(BfError::State("prepare_to_play before set_mic_config".into()));
        };

        let channels = array.mic_config.num_mics();
        let fft_size = array.transform.size();
        let packed_len = array.transform.packed_len();
        let fir_len = array.beam_bank.fir_len();
        let ola_len = fft_size.max(max_block + fir_len - 1);

        let mut beams = Vec::new();
        beams
            .try_reserve_exact(self.params.len())
            .map_err(|e| BfError::Allocation(format!("beam states: {e}")))?;
        for params in &self.params {
            let target = array.grid.index(params);
            beams.push(BeamState {
                fir: FirInterpolation::try_new(&array.beam_bank, target)?,
                ola: OverlapAddBuffer::try_new(ola_len)?,
            });
        }

        let PrefilterConfig { center_hz, q } = self.config.doa_prefilter;
        let mut prefilter = BandpassPrefilter::new(center_hz, q);
        prefilter.prepare(sample_rate, channels);

        let doa_window = fft_size - array.doa_bank.fir_len() + 1;
        let doa = Arc::new(DoaShared::try_new(
            channels,
            doa_window,
            array.mic_config.doa_grid().len(),
        )?);

        let worker = if self.config.doa_update_hz > 0.0 {
            let period = Duration::try_from_secs_f64(1.0 / self.config.doa_update_hz)
                .map_err(|e| {
                    BfError::InvalidParam(format!(
                        "doa_update_hz {} has no usable period: {e}",
                        self.config.doa_update_hz
                    ))
                })?;
            let estimator = DoaEstimator::try_new(
                doa.clone(),
                array.doa_bank.clone(),
                array.transform.clone(),
            )?;
            Some(DoaWorker::spawn(estimator, period)?)
        } else {
            None
        };

        self.prepared = Some(Prepared {
            sample_rate,
            max_block,
            convolver: OverlapAddConvolver::new(array.transform.clone()),
            beams,
            spectra: try_zeroed(channels * packed_len)?,
            accumulator: try_zeroed(packed_len)?,
            scaled: try_zeroed(fft_size - fir_len + 1)?,
            prefilter,
            doa_block: ChannelBuffer::try_new(channels, max_block)?,
            doa,
            worker,
        });

        log::info!(
            "Prepared at {sample_rate} Hz, block {max_block}, {} beams, DOA window {doa_window}",
            self.params.len()
        );
        Ok(())
    }

    /// Stop the DOA worker and free block-size buffers; repeatable
    pub fn release_resources(&mut self) {
        if let Some(mut prepared) = self.prepared.take() {
            if let Some(worker) = prepared.worker.as_mut() {
                worker.stop();
            }
            log::info!("Released beamformer resources");
        }
    }

    // ============ Parameters ============

    /// Store new parameters for `beam`; the FIR follows over the next blocks
    pub fn set_beam_parameters(&mut self, beam: usize, params: BeamParameters) {
        assert!(beam < self.params.len(), "beam {beam} out of range");
        let params = params.clamped();
        self.params[beam] = params;

        if let (Some(array), Some(prepared)) = (&self.array, &mut self.prepared) {
            prepared.beams[beam].fir.set_target(array.grid.index(&params));
        }
    }

    pub fn beam_parameters(&self, beam: usize) -> BeamParameters {
        self.params[beam]
    }

    /// Route channel i straight to beam i
    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    pub fn bypass(&self) -> bool {
        self.bypass
    }

    /// Route channel i through the transform pair into beam i, gain applied
    pub fn set_pass_through(&mut self, pass_through: bool) {
        self.pass_through = pass_through;
    }

    pub fn pass_through(&self) -> bool {
        self.pass_through
    }

    /// Smallest gain across beams, applied to the input
    fn common_gain(&self) -> Sample {
        self.params.iter().map(|p| p.gain).fold(Sample::INFINITY, Sample::min)
    }

    /// Multiplier applied to `beam`'s contribution after input scaling
    pub fn beam_gain_factor(&self, beam: usize) -> Sample {
        gain_factor(self.params[beam].gain, self.common_gain())
    }

    /// Distance between `beam`'s effective FIR and its target entry
    pub fn fir_distance(&self, beam: usize) -> Sample {
        let (array, prepared) = self.ready();
        prepared.beams[beam].fir.distance(&array.beam_bank)
    }

    // ============ Processing ============

    /// Process one block of microphone input
    pub fn process_block(&mut self, input: &ChannelBuffer) {
        let common = self.common_gain();
        let Self {
            config,
            params,
            bypass,
            pass_through,
            array,
            prepared,
            ..
        } = self;
        let (Some(array), Some(prepared)) = (array.as_ref(), prepared.as_mut()) else {
            panic!("process_block called outside the Ready state");
        };

        let channels = array.mic_config.num_mics();
        let len = input.num_samples();
        assert_eq!(input.num_channels(), channels, "input channel count mismatch");
        assert!(len <= prepared.max_block, "block of {len} exceeds prepared maximum");

        // DOA tap
        for (channel, (dst, src)) in prepared
            .doa_block
            .channels_mut()
            .zip(input.channels())
            .enumerate()
        {
            dst[..len].copy_from_slice(src);
            prepared.prefilter.process(channel, &mut dst[..len]);
        }
        prepared.doa.push(&prepared.doa_block, len);

        let alpha = config.fir_smoothing.alpha(len, prepared.sample_rate);
        for beam in &mut prepared.beams {
            beam.fir.advance(&array.beam_bank, alpha);
        }

        if *bypass {
            for (beam, samples) in prepared.beams.iter_mut().zip(input.channels()) {
                beam.ola.add(0, samples, 1.0);
            }
            return;
        }

        let fir_len = array.beam_bank.fir_len();
        let sub_len = prepared.convolver.max_block_len(fir_len);
        let packed_len = prepared.convolver.packed_len();

        let mut offset = 0;
        while offset < len {
            let n = sub_len.min(len - offset);

            if *pass_through {
                // Only the shared input scaling applies; there is no per-beam correction
                for (beam, samples) in prepared.beams.iter_mut().zip(input.channels()) {
                    let samples = &samples[offset..offset + n];
                    prepared.convolver.analyze(samples, &mut prepared.accumulator);
                    let time = prepared.convolver.finish(&prepared.accumulator);
                    beam.ola.add(offset, &time[..n], common);
                }
                offset += n;
                continue;
            }

            for (samples, spectrum) in input
                .channels()
                .zip(prepared.spectra.chunks_exact_mut(packed_len))
            {
                let scaled = &mut prepared.scaled[..n];
                for (dst, &s) in scaled.iter_mut().zip(&samples[offset..offset + n]) {
                    *dst = s * common;
                }
                prepared.convolver.analyze(scaled, spectrum);
            }

            for (beam, p) in prepared.beams.iter_mut().zip(params.iter()) {
                prepared.accumulator.fill(0.0);
                for (channel, spectrum) in prepared.spectra.chunks_exact(packed_len).enumerate() {
                    convolve_accumulate(
                        spectrum,
                        beam.fir.current(channel),
                        &mut prepared.accumulator,
                    );
                }
                let time = prepared.convolver.finish(&prepared.accumulator);
                beam.ola.add(offset, &time[..n + fir_len - 1], gain_factor(p.gain, common));
            }

            offset += n;
        }
    }

    /// Drain `out.num_samples()` samples of every beam into `out`
    pub fn get_beams(&mut self, out: &mut ChannelBuffer) {
        let Some(prepared) = self.prepared.as_mut() else {
            panic!("get_beams called outside the Ready state");
        };
        assert_eq!(
            out.num_channels(),
            prepared.beams.len(),
            "output must have one channel per beam"
        );
        assert!(out.num_samples() <= prepared.max_block, "output longer than prepared block");

        for (beam, dst) in prepared.beams.iter_mut().zip(out.channels_mut()) {
            beam.ola.drain_into(dst);
        }
    }

    // ============ Diagnostics ============

    /// Blend the stored impulse responses nearest `params` into `dst`
    ///
    /// `dst = alpha * ir + (1 - alpha) * dst`, one channel per microphone.
    pub fn get_fir(&self, dst: &mut ChannelBuffer, params: &BeamParameters, alpha: Sample) {
        let Some(array) = self.array.as_ref() else {
            panic!("get_fir called before set_mic_config");
        };
        let bank = &array.beam_bank;
        assert_eq!(dst.num_channels(), bank.num_channels(), "FIR channel count mismatch");
        assert_eq!(dst.num_samples(), bank.fir_len(), "FIR length mismatch");

        let index = array.grid.index(params);
        let keep = 1.0 - alpha;
        for (channel, taps) in dst.channels_mut().enumerate() {
            for (t, &ir) in taps.iter_mut().zip(bank.impulse_response(index, channel)) {
                *t = alpha * ir + keep * *t;
            }
        }
    }

    /// Copy the latest band-passed DOA input window (mics x window)
    pub fn get_doa_input_buffer(&self, out: &mut ChannelBuffer) {
        self.doa_probe_ref().doa_input_buffer(out);
    }

    /// Copy the latest DOA energy profile (dB, row-major)
    pub fn get_doa_energy(&self, out: &mut [Sample]) {
        self.doa_probe_ref().doa_energy(out);
    }

    /// Overwrite the DOA energy profile
    pub fn set_doa_energy(&self, energy: &[Sample]) {
        self.doa_probe_ref().set_doa_energy(energy);
    }

    /// Thread-safe handle onto the DOA state of the current session
    pub fn doa_probe(&self) -> Option<DoaProbe> {
        self.prepared.as_ref().map(|p| DoaProbe::new(p.doa.clone()))
    }

    /// Synchronous estimator sharing the current session's DOA state
    pub fn doa_estimator(&self) -> BfResult<Option<DoaEstimator>> {
        match (&self.array, &self.prepared) {
            (Some(array), Some(prepared)) => Ok(Some(DoaEstimator::try_new(
                prepared.doa.clone(),
                array.doa_bank.clone(),
                array.transform.clone(),
            )?)),
            _ => Ok(None),
        }
    }

    /// Whether the background DOA worker is running
    pub fn doa_worker_running(&self) -> bool {
        self.prepared
            .as_ref()
            .and_then(|p| p.worker.as_ref())
            .is_some_and(DoaWorker::is_running)
    }

    /// Clear overlap-add tails, filter state and DOA history without reallocating
    pub fn reset(&mut self) {
        let (Some(array), Some(prepared)) = (self.array.as_ref(), self.prepared.as_mut()) else {
            return;
        };
        for beam in &mut prepared.beams {
            beam.ola.clear();
            beam.fir.snap(&array.beam_bank);
        }
        prepared.prefilter.reset();
        prepared.doa.clear();
    }

    fn ready(&self) -> (&ArraySetup, &Prepared) {
        match (&self.array, &self.prepared) {
            (Some(array), Some(prepared)) => (array, prepared),
            _ => panic!("beamformer is not prepared"),
        }
    }

    fn doa_probe_ref(&self) -> DoaProbe {
        DoaProbe::new(self.ready().1.doa.clone())
    }
}

impl Drop for Beamformer {
    fn drop(&mut self) {
        self.release_resources();
    }
}

#[inline]
fn gain_factor(gain: Sample, common: Sample) -> Sample {
    if common > 0.0 { gain / common } else { 0.0 }
}
