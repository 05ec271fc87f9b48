//! Gait Flux - Stride segmentation and phase normalization for gait trials
//!
//! Gait Flux turns motion-capture trials into phase-normalized stride tables
//! through a deterministic pipeline: event extraction → stride segmentation
//! → resampling → correction transforms → kinematic chain → velocities →
//! row assembly.
//!
//! ## Modules
//!
//! - **Schema**: gait.trial.v1 JSON input and its adapter to typed trials
//! - **Pipeline**: Per-stride stages, run in parallel across trials and strides
//! - **Encoder**: NDJSON and columnar JSON output with run metadata

pub mod assembler;
pub mod config;
pub mod corrections;
pub mod encoder;
pub mod error;
pub mod events;
pub mod kinematics;
pub mod pipeline;
pub mod resample;
pub mod schema;
pub mod segmenter;
pub mod types;
pub mod velocity;

pub use assembler::{PhaseRow, PhaseTable, StrideBlock, TableSchema};
pub use config::{CorrectionPolicy, PipelineConfig, VelocityStrategy};
pub use encoder::TableEncoder;
pub use error::ComputeError;
pub use kinematics::AngleSign;
pub use pipeline::{process_trials, transform_json, GaitProcessor, PipelineOutput};
pub use types::{Side, SkipReason, SkippedUnit, TrialRecording};

// Schema exports
pub use schema::{RawTrial, TrialAdapter, SCHEMA_VERSION};

/// Gait Flux version embedded in every encoded run
pub const GAIT_FLUX_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for encoded runs
pub const PRODUCER_NAME: &str = "gait-flux";
