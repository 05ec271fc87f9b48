//! Adapter for converting gait.trial.v1 records to trial recordings
//!
//! Channel names are resolved to [`ChannelKind`]s here; names the pipeline
//! does not use are dropped. Units are carried through unchanged and
//! converted later, per stride.

use crate::error::ComputeError;
use crate::schema::trial::*;
use crate::types::{
    ChannelGroupKind, ChannelKind, EventSet, Side, SideTable, SignalGroup, TrialRecording, Unit,
};

/// Adapter for converting raw trials to typed recordings
pub struct TrialAdapter;

impl TrialAdapter {
    /// Parse a JSON string containing an array of RawTrials
    pub fn parse_array(json: &str) -> Result<Vec<RawTrial>, ComputeError> {
        let trials: Vec<RawTrial> = serde_json::from_str(json)?;
        Ok(trials)
    }

    /// Parse NDJSON (newline-delimited JSON) containing RawTrials
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<RawTrial>, ComputeError> {
        let mut trials = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawTrial>(trimmed) {
                Ok(trial) => trials.push(trial),
                Err(e) => {
                    return Err(ComputeError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(trials)
    }

    /// Parse either a JSON array or NDJSON, detected from the first character
    pub fn parse(input: &str) -> Result<Vec<RawTrial>, ComputeError> {
        if input.trim_start().starts_with('[') {
            Self::parse_array(input)
        } else {
            Self::parse_ndjson(input)
        }
    }

    /// Convert one raw trial to a typed recording
    pub fn to_recording(raw: &RawTrial) -> Result<TrialRecording, ComputeError> {
        raw.validate()
            .map_err(|e| ComputeError::InvalidTrial(format!("Invalid trial {}: {}", raw.subject, e)))?;

        let kinematics = convert_group(&raw.kinematics, ChannelGroupKind::Kinematics);
        let kinetics = raw
            .kinetics
            .as_ref()
            .and_then(|g| convert_optional_group(g, ChannelGroupKind::Kinetics));
        let forceplates = raw
            .forceplates
            .as_ref()
            .and_then(|g| convert_optional_group(g, ChannelGroupKind::ForcePlates));

        let events = EventSet {
            heel_strikes: SideTable::new(
                raw.events.left_heel_strike.clone(),
                raw.events.right_heel_strike.clone(),
            ),
            stride_durations: SideTable::new(
                raw.events.left_stride_duration.clone(),
                raw.events.right_stride_duration.clone(),
            ),
            segments: raw.events.segments.clone(),
        };

        Ok(TrialRecording {
            subject: raw.subject.clone(),
            task: raw.task.clone(),
            subject_mass_kg: raw.subject_mass_kg,
            events,
            kinematics,
            kinetics,
            forceplates,
        })
    }

    /// Convert a batch, stopping at the first invalid trial
    pub fn to_recordings(raws: &[RawTrial]) -> Result<Vec<TrialRecording>, ComputeError> {
        raws.iter().map(Self::to_recording).collect()
    }

    /// Validate a batch of trials, returning only the failures
    pub fn validate_trials(trials: &[RawTrial]) -> Vec<ValidationResult> {
        trials
            .iter()
            .enumerate()
            .filter_map(|(idx, trial)| {
                trial.validate().err().map(|error| ValidationResult {
                    index: idx,
                    subject: trial.subject.clone(),
                    task_id: trial.task.task_id.clone(),
                    error,
                })
            })
            .collect()
    }
}

/// A trial that failed validation
#[derive(Debug)]
pub struct ValidationResult {
    pub index: usize,
    pub subject: String,
    pub task_id: String,
    pub error: ValidationError,
}

/// An optional group without any known channel is treated as absent
fn convert_optional_group(raw: &RawChannelGroup, group: ChannelGroupKind) -> Option<SignalGroup> {
    let signals = convert_group(raw, group);
    if signals.channels.is_empty() {
        tracing::debug!(group = group_name(group), "no known channels, treating group as absent");
        return None;
    }
    Some(signals)
}

fn convert_group(raw: &RawChannelGroup, group: ChannelGroupKind) -> SignalGroup {
    let unit = raw.unit.unwrap_or_else(|| Unit::default_for(group));
    let mut signals = SignalGroup::new(raw.rate_hz, unit);

    for (name, channel) in &raw.channels {
        let Some(kind) = ChannelKind::from_name(name) else {
            tracing::debug!(channel = %name, group = group_name(group), "ignoring unknown channel");
            continue;
        };
        if let Some(both) = &channel.both {
            signals.insert_bilateral(kind, both.clone());
            continue;
        }
        for (side, samples) in [(Side::Left, &channel.left), (Side::Right, &channel.right)] {
            if let Some(samples) = samples {
                signals.insert(kind, side, samples.clone());
            }
        }
    }
    signals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskInfo;
    use pretty_assertions::assert_eq;

    fn make_raw() -> RawTrial {
        let mut kinematics = RawChannelGroup::new(100.0, Unit::Degrees)
            .with_channel("knee_flexion_angle", Some(vec![5.0; 10]), Some(vec![6.0; 10]))
            .with_channel("wrist_angle", Some(vec![1.0; 10]), None);
        kinematics.channels.insert(
            "pelvis_tilt_angle".to_string(),
            RawChannel {
                both: Some(vec![3.0; 10]),
                ..Default::default()
            },
        );
        let task = TaskInfo {
            task: "level_walking".to_string(),
            task_id: "level_1.0".to_string(),
            task_info: String::new(),
            incline_deg: None,
        };
        RawTrial::new("AB03", task, kinematics).with_heel_strikes(vec![0, 5], vec![2, 7])
    }

    #[test]
    fn test_parse_ndjson() {
        let line = serde_json::to_string(&make_raw()).unwrap();
        let ndjson = format!("{line}\n\n{line}\n");
        let trials = TrialAdapter::parse_ndjson(&ndjson).unwrap();
        assert_eq!(trials.len(), 2);
        assert_eq!(TrialAdapter::parse(&ndjson).unwrap().len(), 2);
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let line = serde_json::to_string(&make_raw()).unwrap();
        let ndjson = format!("{line}\n{{not json}}\n");
        let err = TrialAdapter::parse_ndjson(&ndjson).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_parse_array() {
        let json = serde_json::to_string(&vec![make_raw()]).unwrap();
        assert_eq!(TrialAdapter::parse(&json).unwrap().len(), 1);
    }

    #[test]
    fn test_to_recording() {
        let recording = TrialAdapter::to_recording(&make_raw()).unwrap();
        assert_eq!(recording.subject, "AB03");
        assert_eq!(recording.kinematics.unit, Unit::Degrees);
        assert_eq!(recording.kinematics.channels.len(), 2);
        assert_eq!(
            recording
                .kinematics
                .channel(ChannelKind::PelvisTiltAngle, Side::Right),
            Some(&[3.0; 10][..])
        );
        assert_eq!(recording.events.heel_strikes.right, vec![2, 7]);
        assert!(recording.validate().is_ok());
    }

    #[test]
    fn test_default_unit_by_group() {
        let mut raw = make_raw();
        raw.kinematics.unit = None;
        raw.kinetics = Some(
            RawChannelGroup {
                rate_hz: 100.0,
                unit: None,
                channels: Default::default(),
            }
            .with_channel("knee_flexion_moment", Some(vec![1.0; 10]), Some(vec![1.0; 10])),
        );
        let recording = TrialAdapter::to_recording(&raw).unwrap();
        assert_eq!(recording.kinematics.unit, Unit::Degrees);
        assert_eq!(recording.kinetics.unwrap().unit, Unit::NewtonMeters);
    }

    #[test]
    fn test_optional_group_without_known_channels_is_absent() {
        let mut raw = make_raw();
        raw.kinetics = Some(RawChannelGroup::new(100.0, Unit::NewtonMeters).with_channel(
            "hip_adduction_moment",
            Some(vec![1.0; 10]),
            Some(vec![1.0; 10]),
        ));
        raw.forceplates = Some(RawChannelGroup::new(1000.0, Unit::Newtons));

        let recording = TrialAdapter::to_recording(&raw).unwrap();
        assert!(recording.kinetics.is_none());
        assert!(recording.forceplates.is_none());
        assert!(recording.validate().is_ok());
    }

    #[test]
    fn test_validate_trials_reports_failures() {
        let mut bad = make_raw();
        bad.subject = " ".to_string();
        let results = TrialAdapter::validate_trials(&[make_raw(), bad]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].index, 1);
        assert!(matches!(results[0].error, ValidationError::EmptySubject));
        assert!(TrialAdapter::to_recordings(&[make_raw()]).is_ok());
    }
}
