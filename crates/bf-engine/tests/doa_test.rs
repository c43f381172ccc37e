//! DOA Integration Tests
//!
//! Verifies the direction-of-arrival path end to end:
//! - A plane wave peaks in the matching grid cell
//! - Cycles are skipped until a full window is captured
//! - The background worker publishes and shuts down
//! - Snapshots never mix samples from different blocks under concurrency

use std::f64::consts::PI;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bf_core::{BeamParameters, ChannelBuffer, MIN_DB, MicArrayConfig, Sample};
use bf_engine::{Beamformer, DelayAndSumDesign, EngineConfig, PanLaw, mix_to_stereo};

const SAMPLE_RATE: f64 = 48000.0;
const SOUND_SPEED: f64 = 343.0;
const BLOCK: usize = 512;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn design() -> DelayAndSumDesign {
    DelayAndSumDesign::new(SAMPLE_RATE, 128).with_grid(5, 3, 2)
}

fn engine(doa_update_hz: f64, num_beams: usize) -> Beamformer {
    init_logging();
    let config = EngineConfig {
        num_beams,
        doa_update_hz,
        ..EngineConfig::default()
    };
    let mut bf = Beamformer::new(config, Arc::new(design())).unwrap();
    bf.set_mic_config(MicArrayConfig::Ula1).unwrap();
    bf.prepare_to_play(SAMPLE_RATE, BLOCK).unwrap();
    bf
}

/// Far-field tone arriving from direction cosine `u` on a single stick
fn plane_wave(freq: f64, u: f64, start: usize, len: usize) -> ChannelBuffer {
    let channels: Vec<Vec<Sample>> = MicArrayConfig::Ula1
        .mic_positions()
        .iter()
        .map(|&(x, _)| {
            let lead = x as f64 * u / SOUND_SPEED;
            (start..start + len)
                .map(|n| (2.0 * PI * freq * (n as f64 / SAMPLE_RATE + lead)).sin() as Sample)
                .collect()
        })
        .collect();
    ChannelBuffer::from_channels(&channels)
}

fn argmax(values: &[Sample]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════════
// ESTIMATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_doa_points_at_source() {
    let mut bf = engine(0.0, 1);
    let mut out = ChannelBuffer::new(1, BLOCK);
    for block in 0..6 {
        bf.process_block(&plane_wave(2000.0, 0.5, block * BLOCK, BLOCK));
        bf.get_beams(&mut out);
    }

    let mut estimator = bf.doa_estimator().unwrap().unwrap();
    assert!(estimator.run_cycle());

    let mut energy = vec![0.0; estimator.num_cells()];
    bf.get_doa_energy(&mut energy);
    assert_eq!(energy.len(), 25);

    // u = 0.5 is column 18 of 25
    let peak = argmax(&energy);
    assert!((17..=19).contains(&peak), "peak at cell {peak}: {energy:?}");
    assert!(energy[18] > energy[0] + 6.0);
    assert!(energy[18] > energy[6] + 6.0);
}

#[test]
fn test_beam_favours_steered_direction() {
    let mut bf = engine(0.0, 2);
    bf.set_beam_parameters(0, BeamParameters::new(0.5, 0.0).with_pan(-1.0));
    bf.set_beam_parameters(1, BeamParameters::new(-0.5, 0.0).with_pan(1.0));
    bf.reset();

    let mut out = ChannelBuffer::new(2, BLOCK);
    let mut left = vec![0.0; BLOCK];
    let mut right = vec![0.0; BLOCK];
    for block in 0..4 {
        bf.process_block(&plane_wave(2000.0, 0.5, block * BLOCK, BLOCK));
        bf.get_beams(&mut out);
    }
    let params = [bf.beam_parameters(0), bf.beam_parameters(1)];
    mix_to_stereo(&out, &params, &mut left, &mut right, PanLaw::Linear);

    let rms = |s: &[Sample]| (s.iter().map(|x| x * x).sum::<Sample>() / s.len() as Sample).sqrt();
    assert!(rms(out.channel(0)) > 0.6, "on-axis beam rms {}", rms(out.channel(0)));
    assert!(rms(out.channel(0)) > 4.0 * rms(out.channel(1)));
    assert_eq!(left.as_slice(), out.channel(0));
    assert_eq!(right.as_slice(), out.channel(1));
}

#[test]
fn test_short_history_keeps_profile() {
    let mut bf = engine(0.0, 1);
    let window = bf.doa_window_len().unwrap();
    assert_eq!(window, 256 - 128 + 1);

    let injected: Vec<Sample> = (0..25).map(|i| -(i as Sample)).collect();
    bf.set_doa_energy(&injected);

    bf.process_block(&plane_wave(2000.0, 0.0, 0, window - 1));
    let mut estimator = bf.doa_estimator().unwrap().unwrap();
    assert!(!estimator.run_cycle());

    let mut energy = vec![0.0; 25];
    bf.get_doa_energy(&mut energy);
    assert_eq!(energy, injected);

    bf.process_block(&plane_wave(2000.0, 0.0, window - 1, 1));
    assert!(estimator.run_cycle());
    bf.get_doa_energy(&mut energy);
    assert_ne!(energy, injected);
}

#[test]
fn test_worker_runs_until_release() {
    let mut bf = engine(50.0, 1);
    assert!(bf.doa_worker_running());
    let probe = bf.doa_probe().unwrap();

    let mut out = ChannelBuffer::new(1, BLOCK);
    for block in 0..2 {
        bf.process_block(&plane_wave(2000.0, -0.5, block * BLOCK, BLOCK));
        bf.get_beams(&mut out);
    }

    let mut energy = vec![MIN_DB; probe.num_cells()];
    let deadline = Instant::now() + Duration::from_secs(5);
    while energy.iter().all(|&e| e == MIN_DB) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
        probe.doa_energy(&mut energy);
    }
    assert!(energy.iter().any(|&e| e > MIN_DB));
    assert!((5..=7).contains(&argmax(&energy)));

    bf.release_resources();
    assert!(!bf.doa_worker_running());
    // Probes outlive the session
    probe.doa_energy(&mut energy);
}

// ═══════════════════════════════════════════════════════════════════════════════
// SNAPSHOT CONSISTENCY
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_snapshot_has_no_torn_reads() {
    let mut bf = engine(10.0, 1);
    let probe = bf.doa_probe().unwrap();
    let window = probe.window_len();

    let writer = thread::spawn(move || {
        let mut out = ChannelBuffer::new(1, 64);
        for block in 0..2000usize {
            // Identical channels, a different ramp every block
            let samples: Vec<Sample> = (0..64)
                .map(|n| ((block * 64 + n) % 977) as Sample * 1e-3)
                .collect();
            let input = ChannelBuffer::from_channels(&vec![samples; 16]);
            bf.process_block(&input);
            bf.get_beams(&mut out);
        }
        bf
    });

    let mut snapshot = ChannelBuffer::new(16, window);
    let mut reads = 0;
    while !writer.is_finished() || reads == 0 {
        probe.doa_input_buffer(&mut snapshot);
        assert_eq!(snapshot.num_samples(), window);
        let reference = snapshot.channel_sum(0);
        for channel in 1..16 {
            assert_eq!(snapshot.channel(channel), snapshot.channel(0));
            assert_eq!(snapshot.channel_sum(channel), reference);
        }
        reads += 1;
    }

    let mut bf = writer.join().unwrap();
    bf.release_resources();
    assert!(reads > 0);
}
