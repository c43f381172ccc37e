//! bf-engine: Real-time microphone-array beamforming
//!
//! ## Components
//! - [`Beamformer`] - lifecycle, per-block beam processing and diagnostics
//! - [`DoaEstimator`] / [`DoaWorker`] - background direction-of-arrival energy map
//! - [`FirLibrary`] - per-layout FIR tables, from JSON ([`FirTableSet`]) or
//!   generated ([`DelayAndSumDesign`])
//! - [`mix_to_stereo`] - pan-law fold-down of the beams
//!
//! ## Threads
//! The audio thread owns the [`Beamformer`]. The DOA worker only shares the
//! input ring and the energy profile with it, each behind a short-held
//! `parking_lot::Mutex`.

mod beamformer;
mod config;
mod design;
mod doa;
mod mixer;
mod snapshot;
mod tables;

pub use beamformer::{Beamformer, EngineState};
pub use config::{EngineConfig, FirSmoothing, MIN_DOA_UPDATE_HZ, PrefilterConfig};
pub use design::DelayAndSumDesign;
pub use doa::{DoaEstimator, DoaProbe, DoaWorker};
pub use mixer::{PanLaw, mix_to_stereo};
pub use snapshot::DoaInputRing;
pub use tables::{FirLibrary, FirTableSet, FirTables, SteeringGrid};
