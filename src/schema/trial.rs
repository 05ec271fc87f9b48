//! gait.trial.v1 record
//!
//! One record describes one subject performing one task condition. Channels
//! are keyed by name and carry per-side sample arrays; a `both` array is used
//! for unilateral sensors and is applied to each side.
//!
//! Example:
//!
//! ```json
//! {
//!   "schema_version": "gait.trial.v1",
//!   "subject": "AB01",
//!   "task": {"task": "level_walking", "task_id": "level_1.2", "task_info": "speed_m_s:1.2"},
//!   "subject_mass_kg": 72.5,
//!   "events": {"left_heel_strike": [12, 118], "right_heel_strike": [0, 100, 205]},
//!   "kinematics": {
//!     "rate_hz": 100.0,
//!     "unit": "deg",
//!     "channels": {"knee_flexion_angle": {"left": [], "right": []}}
//!   }
//! }
//! ```

use crate::types::{ChannelGroupKind, ChannelKind, SegmentWindow, TaskInfo, Unit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current schema version
pub const SCHEMA_VERSION: &str = "gait.trial.v1";

/// A trial as it arrives on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawTrial {
    /// Schema version identifier
    pub schema_version: String,

    /// Subject identifier
    pub subject: String,

    /// Task taxonomy
    pub task: TaskInfo,

    /// Body mass (kg), required for moment and force normalization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_mass_kg: Option<f64>,

    /// Gait events, in kinematic frames
    pub events: RawEvents,

    pub kinematics: RawChannelGroup,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinetics: Option<RawChannelGroup>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forceplates: Option<RawChannelGroup>,
}

/// Heel strikes, stride durations and segment cut-points
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvents {
    #[serde(default)]
    pub left_heel_strike: Vec<usize>,
    #[serde(default)]
    pub right_heel_strike: Vec<usize>,
    /// Precomputed stride durations (frames)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_stride_duration: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_stride_duration: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub segments: Vec<SegmentWindow>,
}

/// Channels recorded at one sampling rate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawChannelGroup {
    pub rate_hz: f64,
    /// Declared unit; the group's conventional unit when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<Unit>,
    pub channels: BTreeMap<String, RawChannel>,
}

/// Per-side sample arrays of one channel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawChannel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<Vec<f64>>,
    /// Samples shared by both sides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub both: Option<Vec<f64>>,
}

impl RawChannel {
    fn arrays(&self) -> impl Iterator<Item = &Vec<f64>> {
        [self.left.as_ref(), self.right.as_ref(), self.both.as_ref()]
            .into_iter()
            .flatten()
    }
}

impl RawChannelGroup {
    pub fn new(rate_hz: f64, unit: Unit) -> Self {
        Self {
            rate_hz,
            unit: Some(unit),
            channels: BTreeMap::new(),
        }
    }

    /// Add a channel with per-side samples
    pub fn with_channel(mut self, name: &str, left: Option<Vec<f64>>, right: Option<Vec<f64>>) -> Self {
        let channel = self.channels.entry(name.to_string()).or_default();
        channel.left = left;
        channel.right = right;
        self
    }

    fn validate(&self, group: ChannelGroupKind) -> Result<(), ValidationError> {
        if !(self.rate_hz.is_finite() && self.rate_hz > 0.0) {
            return Err(ValidationError::InvalidRate {
                group: group_name(group).to_string(),
                rate_hz: self.rate_hz,
            });
        }
        if let Some(unit) = self.unit {
            if !unit.is_compatible_with(group) {
                return Err(ValidationError::InvalidUnit {
                    group: group_name(group).to_string(),
                    unit: unit.as_str().to_string(),
                });
            }
        }
        for (name, channel) in &self.channels {
            if channel.both.is_some() && (channel.left.is_some() || channel.right.is_some()) {
                return Err(ValidationError::AmbiguousChannel(name.clone()));
            }
            if channel.arrays().any(|a| a.is_empty()) {
                return Err(ValidationError::EmptyChannel(name.clone()));
            }
            if let Some(kind) = ChannelKind::from_name(name) {
                if kind.group() != group {
                    return Err(ValidationError::MisplacedChannel {
                        channel: name.clone(),
                        group: group_name(group).to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn group_name(group: ChannelGroupKind) -> &'static str {
    match group {
        ChannelGroupKind::Kinematics => "kinematics",
        ChannelGroupKind::Kinetics => "kinetics",
        ChannelGroupKind::ForcePlates => "forceplates",
    }
}

impl RawTrial {
    /// Create a trial with the current schema version and no events
    pub fn new(subject: impl Into<String>, task: TaskInfo, kinematics: RawChannelGroup) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            subject: subject.into(),
            task,
            subject_mass_kg: None,
            events: RawEvents::default(),
            kinematics,
            kinetics: None,
            forceplates: None,
        }
    }

    pub fn with_mass(mut self, mass_kg: f64) -> Self {
        self.subject_mass_kg = Some(mass_kg);
        self
    }

    pub fn with_heel_strikes(mut self, left: Vec<usize>, right: Vec<usize>) -> Self {
        self.events.left_heel_strike = left;
        self.events.right_heel_strike = right;
        self
    }

    /// Validate the record schema
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        if self.subject.trim().is_empty() {
            return Err(ValidationError::EmptySubject);
        }

        if let Some(mass) = self.subject_mass_kg {
            if !(mass.is_finite() && mass > 0.0) {
                return Err(ValidationError::InvalidMass(mass));
            }
        }

        self.kinematics.validate(ChannelGroupKind::Kinematics)?;
        if let Some(kinetics) = &self.kinetics {
            kinetics.validate(ChannelGroupKind::Kinetics)?;
        }
        if let Some(forceplates) = &self.forceplates {
            forceplates.validate(ChannelGroupKind::ForcePlates)?;
        }
        Ok(())
    }
}

/// Validation errors for raw trials
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Subject identifier is empty")]
    EmptySubject,

    #[error("Subject mass must be positive, got {0}")]
    InvalidMass(f64),

    #[error("Invalid sampling rate for {group}: {rate_hz}")]
    InvalidRate { group: String, rate_hz: f64 },

    #[error("Unit {unit} is not valid for {group}")]
    InvalidUnit { group: String, unit: String },

    #[error("Channel {0} has an empty sample array")]
    EmptyChannel(String),

    #[error("Channel {0} declares both per-side and shared samples")]
    AmbiguousChannel(String),

    #[error("Channel {channel} does not belong in {group}")]
    MisplacedChannel { channel: String, group: String },
}
