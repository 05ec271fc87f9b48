//! Core types for the Gait Flux pipeline
//!
//! This module defines the data structures that flow into and through the
//! pipeline: trial recordings, event sets, stride windows, and the records
//! describing units of work that were skipped.

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::{Index, IndexMut};

/// Body side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Left => "left",
            Side::Right => "right",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }
}

/// Role of a leg relative to the stride's reference side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Ipsi,
    Contra,
}

impl Role {
    pub const BOTH: [Role; 2] = [Role::Ipsi, Role::Contra];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Ipsi => "ipsi",
            Role::Contra => "contra",
        }
    }

    /// Physical side playing this role when `reference` is the ipsilateral leg
    pub fn side(&self, reference: Side) -> Side {
        match self {
            Role::Ipsi => reference,
            Role::Contra => reference.opposite(),
        }
    }
}

/// A pair of values indexed by body side
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SideTable<T> {
    pub left: T,
    pub right: T,
}

impl<T> SideTable<T> {
    pub fn new(left: T, right: T) -> Self {
        Self { left, right }
    }
}

impl<T> Index<Side> for SideTable<T> {
    type Output = T;

    fn index(&self, side: Side) -> &T {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

impl<T> IndexMut<Side> for SideTable<T> {
    fn index_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

/// Channel group a recorded signal belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelGroupKind {
    Kinematics,
    Kinetics,
    ForcePlates,
}

/// Recorded input channels understood by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    HipFlexionAngle,
    KneeFlexionAngle,
    AnkleDorsiflexionAngle,
    /// Sagittal foot orientation, subject to an unknown 90° multiple and sign
    FootAngle,
    PelvisTiltAngle,
    HipFlexionMoment,
    KneeFlexionMoment,
    AnkleDorsiflexionMoment,
    VerticalForce,
    AnteriorForce,
    LateralForce,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 11] = [
        ChannelKind::HipFlexionAngle,
        ChannelKind::KneeFlexionAngle,
        ChannelKind::AnkleDorsiflexionAngle,
        ChannelKind::FootAngle,
        ChannelKind::PelvisTiltAngle,
        ChannelKind::HipFlexionMoment,
        ChannelKind::KneeFlexionMoment,
        ChannelKind::AnkleDorsiflexionMoment,
        ChannelKind::VerticalForce,
        ChannelKind::AnteriorForce,
        ChannelKind::LateralForce,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::HipFlexionAngle => "hip_flexion_angle",
            ChannelKind::KneeFlexionAngle => "knee_flexion_angle",
            ChannelKind::AnkleDorsiflexionAngle => "ankle_dorsiflexion_angle",
            ChannelKind::FootAngle => "foot_angle",
            ChannelKind::PelvisTiltAngle => "pelvis_tilt_angle",
            ChannelKind::HipFlexionMoment => "hip_flexion_moment",
            ChannelKind::KneeFlexionMoment => "knee_flexion_moment",
            ChannelKind::AnkleDorsiflexionMoment => "ankle_dorsiflexion_moment",
            ChannelKind::VerticalForce => "vertical_force",
            ChannelKind::AnteriorForce => "anterior_force",
            ChannelKind::LateralForce => "lateral_force",
        }
    }

    /// Look up a channel by its input name
    pub fn from_name(name: &str) -> Option<ChannelKind> {
        ChannelKind::ALL.iter().copied().find(|k| k.as_str() == name)
    }

    pub fn group(&self) -> ChannelGroupKind {
        match self {
            ChannelKind::HipFlexionAngle
            | ChannelKind::KneeFlexionAngle
            | ChannelKind::AnkleDorsiflexionAngle
            | ChannelKind::FootAngle
            | ChannelKind::PelvisTiltAngle => ChannelGroupKind::Kinematics,
            ChannelKind::HipFlexionMoment
            | ChannelKind::KneeFlexionMoment
            | ChannelKind::AnkleDorsiflexionMoment => ChannelGroupKind::Kinetics,
            ChannelKind::VerticalForce | ChannelKind::AnteriorForce | ChannelKind::LateralForce => {
                ChannelGroupKind::ForcePlates
            }
        }
    }
}

/// Measurement unit of a channel group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "deg")]
    Degrees,
    #[serde(rename = "rad")]
    Radians,
    #[serde(rename = "Nm")]
    NewtonMeters,
    #[serde(rename = "Nm_kg")]
    NewtonMetersPerKg,
    #[serde(rename = "N")]
    Newtons,
    #[serde(rename = "BW")]
    BodyWeight,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Degrees => "deg",
            Unit::Radians => "rad",
            Unit::NewtonMeters => "Nm",
            Unit::NewtonMetersPerKg => "Nm_kg",
            Unit::Newtons => "N",
            Unit::BodyWeight => "BW",
        }
    }

    /// Unit a channel group is expected to arrive in when none is declared
    pub fn default_for(group: ChannelGroupKind) -> Unit {
        match group {
            ChannelGroupKind::Kinematics => Unit::Degrees,
            ChannelGroupKind::Kinetics => Unit::NewtonMeters,
            ChannelGroupKind::ForcePlates => Unit::Newtons,
        }
    }

    pub fn is_compatible_with(&self, group: ChannelGroupKind) -> bool {
        matches!(
            (group, self),
            (ChannelGroupKind::Kinematics, Unit::Degrees | Unit::Radians)
                | (
                    ChannelGroupKind::Kinetics,
                    Unit::NewtonMeters | Unit::NewtonMetersPerKg
                )
                | (ChannelGroupKind::ForcePlates, Unit::Newtons | Unit::BodyWeight)
        )
    }
}

/// Channels recorded at one sampling rate
#[derive(Debug, Clone, PartialEq)]
pub struct SignalGroup {
    /// Sampling rate (Hz)
    pub rate_hz: f64,
    /// Unit every channel of the group is expressed in
    pub unit: Unit,
    /// Per-side sample arrays keyed by channel
    pub channels: HashMap<ChannelKind, SideTable<Option<Vec<f64>>>>,
}

impl SignalGroup {
    pub fn new(rate_hz: f64, unit: Unit) -> Self {
        Self {
            rate_hz,
            unit,
            channels: HashMap::new(),
        }
    }

    /// Insert samples for one side of a channel
    pub fn insert(&mut self, kind: ChannelKind, side: Side, samples: Vec<f64>) {
        self.channels.entry(kind).or_default()[side] = Some(samples);
    }

    /// Insert the same samples on both sides (unilateral sensors such as the pelvis)
    pub fn insert_bilateral(&mut self, kind: ChannelKind, samples: Vec<f64>) {
        let table = self.channels.entry(kind).or_default();
        table.left = Some(samples.clone());
        table.right = Some(samples);
    }

    pub fn channel(&self, kind: ChannelKind, side: Side) -> Option<&[f64]> {
        self.channels
            .get(&kind)
            .and_then(|t| t[side].as_deref())
    }

    /// Number of frames, taken from the longest channel
    pub fn frames(&self) -> usize {
        self.arrays().map(|a| a.len()).max().unwrap_or(0)
    }

    fn arrays(&self) -> impl Iterator<Item = &Vec<f64>> {
        self.channels
            .values()
            .flat_map(|t| [t.left.as_ref(), t.right.as_ref()])
            .flatten()
    }

    fn validate(&self, group: ChannelGroupKind) -> Result<(), ComputeError> {
        if !(self.rate_hz.is_finite() && self.rate_hz > 0.0) {
            return Err(ComputeError::InvalidTrial(format!(
                "{:?} sampling rate must be positive, got {}",
                group, self.rate_hz
            )));
        }
        if !self.unit.is_compatible_with(group) {
            return Err(ComputeError::InvalidTrial(format!(
                "unit '{}' is not valid for {:?}",
                self.unit.as_str(),
                group
            )));
        }
        let frames = self.frames();
        if frames == 0 {
            return Err(ComputeError::InvalidTrial(format!(
                "{:?} channels are empty",
                group
            )));
        }
        if self.arrays().any(|a| a.len() != frames) {
            return Err(ComputeError::InvalidTrial(format!(
                "{:?} channels have inconsistent lengths",
                group
            )));
        }
        Ok(())
    }
}

/// Task taxonomy for a trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Task family (e.g. "level_walking", "incline_walking")
    pub task: String,
    /// Task condition identifier
    pub task_id: String,
    /// Free-form condition description (speed, incline, ...)
    #[serde(default)]
    pub task_info: String,
    /// Ground incline in degrees, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incline_deg: Option<f64>,
}

impl TaskInfo {
    /// Whether the task is classified as incline walking
    pub fn is_incline(&self) -> bool {
        self.task.contains("incline") || self.incline_deg.is_some_and(|d| d > 0.0)
    }
}

/// Sub-window of a trial, in event frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentWindow {
    pub start: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Heel strikes and stride annotations for a trial
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventSet {
    /// Heel-strike frames per side, strictly increasing
    pub heel_strikes: SideTable<Vec<usize>>,
    /// Precomputed stride durations (frames), `durations[i]` belongs to `heel_strikes[i]`
    pub stride_durations: SideTable<Option<Vec<f64>>>,
    /// Optional cut-points; an empty list means the whole trial is one segment
    pub segments: Vec<SegmentWindow>,
}

impl EventSet {
    fn validate(&self) -> Result<(), ComputeError> {
        for side in Side::BOTH {
            let strikes = &self.heel_strikes[side];
            if strikes.windows(2).any(|w| w[1] <= w[0]) {
                return Err(ComputeError::InvalidTrial(format!(
                    "{} heel strikes are not strictly increasing",
                    side.as_str()
                )));
            }
            if let Some(durations) = &self.stride_durations[side] {
                if durations.iter().any(|d| !(d.is_finite() && *d > 0.0)) {
                    return Err(ComputeError::InvalidTrial(format!(
                        "{} stride durations must be positive",
                        side.as_str()
                    )));
                }
            }
        }
        if let Some(seg) = self.segments.iter().find(|s| s.end <= s.start) {
            return Err(ComputeError::InvalidTrial(format!(
                "segment [{}, {}] is empty",
                seg.start, seg.end
            )));
        }
        Ok(())
    }
}

/// One subject performing one task condition
#[derive(Debug, Clone, PartialEq)]
pub struct TrialRecording {
    pub subject: String,
    pub task: TaskInfo,
    /// Body mass used for moment and force normalization
    pub subject_mass_kg: Option<f64>,
    /// Heel strikes are expressed in kinematic frames
    pub events: EventSet,
    pub kinematics: SignalGroup,
    pub kinetics: Option<SignalGroup>,
    pub forceplates: Option<SignalGroup>,
}

impl TrialRecording {
    /// Sampling rate the event indices are expressed in
    pub fn event_rate_hz(&self) -> f64 {
        self.kinematics.rate_hz
    }

    /// Check the structural invariants whose violation makes the whole trial unusable
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.subject.trim().is_empty() {
            return Err(ComputeError::MissingField("subject".to_string()));
        }
        if let Some(mass) = self.subject_mass_kg {
            if !(mass.is_finite() && mass > 0.0) {
                return Err(ComputeError::InvalidTrial(format!(
                    "subject mass must be positive, got {mass}"
                )));
            }
        }
        self.kinematics.validate(ChannelGroupKind::Kinematics)?;
        if let Some(kinetics) = &self.kinetics {
            kinetics.validate(ChannelGroupKind::Kinetics)?;
        }
        if let Some(forceplates) = &self.forceplates {
            forceplates.validate(ChannelGroupKind::ForcePlates)?;
        }
        self.events.validate()
    }
}

/// A stride window for one reference side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaitCycle {
    pub reference_side: Side,
    /// First frame of the window (event rate)
    pub start_frame: usize,
    /// Last frame of the window, inclusive (event rate)
    pub end_frame: usize,
    pub duration_frames: f64,
    pub stride_index: usize,
    /// Index of the trial segment the stride belongs to
    pub segment: usize,
}

impl GaitCycle {
    pub fn duration_s(&self, rate_hz: f64) -> f64 {
        self.duration_frames / rate_hz
    }
}

/// Why a unit of work produced no (or partial) output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    MissingChannel {
        channel: String,
    },
    InsufficientEvents {
        heel_strikes: usize,
    },
    DegenerateStrideWindow {
        start_frame: usize,
        end_frame: usize,
        samples: usize,
    },
    CorrectionDidNotConverge {
        channel: String,
        iterations: usize,
    },
    InvalidTrial {
        message: String,
    },
}

/// Machine-readable record of a skipped trial, segment, stride or output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedUnit {
    pub subject: String,
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<Side>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    pub reason: SkipReason,
}

impl SkippedUnit {
    pub fn new(subject: impl Into<String>, task_id: impl Into<String>, reason: SkipReason) -> Self {
        Self {
            subject: subject.into(),
            task_id: task_id.into(),
            segment: None,
            side: None,
            step: None,
            reason,
        }
    }

    /// Skip scoped to a whole trial
    pub fn trial(trial: &TrialRecording, reason: SkipReason) -> Self {
        Self::new(trial.subject.as_str(), trial.task.task_id.as_str(), reason)
    }

    pub fn with_segment(mut self, segment: usize) -> Self {
        self.segment = Some(segment);
        self
    }

    pub fn with_side(mut self, side: Side) -> Self {
        self.side = Some(side);
        self
    }

    pub fn with_step(mut self, step: usize) -> Self {
        self.step = Some(step);
        self
    }
}
