//! Error types for Gait Flux

use thiserror::Error;

/// Errors that can occur during computation
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse trial payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid trial: {0}")]
    InvalidTrial(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Insufficient events for computation: {0}")]
    InsufficientEvents(String),

    #[error("Degenerate stride window: {0}")]
    DegenerateStrideWindow(String),

    #[error("Offset correction did not converge after {iterations} iterations (first sample {first_sample_rad} rad)")]
    CorrectionDidNotConverge {
        iterations: usize,
        first_sample_rad: f64,
    },

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
