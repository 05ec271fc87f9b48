//! gait.trial.v1 input schema
//!
//! This module defines the JSON form of a trial recording and the adapter that
//! turns it into the typed [`TrialRecording`](crate::types::TrialRecording)
//! consumed by the pipeline.

mod adapter;
mod trial;

pub use adapter::*;
pub use trial::*;
