//! Error types for the beamforming engine
//!
//! Only setup paths return errors. The per-block audio path treats misuse as a
//! contract violation and panics instead.

use thiserror::Error;

use crate::MicArrayConfig;

/// Core error type
#[derive(Error, Debug)]
pub enum BfError {
    #[error("Invalid channel count: expected {expected}, got {got}")]
    InvalidChannelCount { expected: usize, got: usize },

    #[error("Invalid FIR table: {0}")]
    TableShape(String),

    #[error("No FIR tables for microphone layout {0:?}")]
    UnsupportedLayout(MicArrayConfig),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    #[error("Invalid engine state: {0}")]
    State(String),

    #[error("Allocation failed: {0}")]
    Allocation(String),

    #[error("Worker thread error: {0}")]
    Thread(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias
pub type BfResult<T> = Result<T, BfError>;
