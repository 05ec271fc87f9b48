//! Correction transforms
//!
//! Deterministic fixes for ambiguous sensor conventions:
//! - Removal of an unknown offset that is an exact multiple of 90°
//! - Sign-flip detection from two reference samples late in stance
//!
//! Both the foot-angle and the incline ankle corrections are the same
//! parameterized [`OffsetCorrection`], differing only in whether the sign
//! flip runs and which reference samples it inspects.

use crate::config::CorrectionPolicy;
use crate::error::ComputeError;
use crate::types::{Role, TaskInfo};
use std::f64::consts::FRAC_PI_2;

/// First-sample magnitude above which a 90° offset is assumed (50°)
pub const OFFSET_THRESHOLD_RAD: f64 = 50.0 * std::f64::consts::PI / 180.0;

/// Reference samples for the sign flip on the canonical 150-sample grid
pub const SIGN_REFERENCE_INDICES: (usize, usize) = (95, 100);

const CANONICAL_SAMPLES: usize = 150;

/// What a correction did to a sequence
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CorrectionOutcome {
    /// Offset added to every sample (rad)
    pub offset_rad: f64,
    pub iterations: usize,
    pub flipped: bool,
}

/// Offset removal optionally followed by sign-flip detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetCorrection {
    pub reference_indices: (usize, usize),
    pub apply_sign_flip: bool,
    pub max_iterations: usize,
}

impl OffsetCorrection {
    /// Foot-angle variant: offset removal plus sign flip at the role's reference samples
    pub fn foot(samples: usize, role: Role, max_iterations: usize) -> Self {
        Self {
            reference_indices: reference_indices(samples, role),
            apply_sign_flip: true,
            max_iterations,
        }
    }

    /// Offset removal only
    pub fn offset_only(samples: usize, max_iterations: usize) -> Self {
        Self {
            reference_indices: reference_indices(samples, Role::Ipsi),
            apply_sign_flip: false,
            max_iterations,
        }
    }

    /// Correct `sequence` in place
    ///
    /// On `CorrectionDidNotConverge` the sequence is left untouched.
    pub fn apply(&self, sequence: &mut [f64]) -> Result<CorrectionOutcome, ComputeError> {
        let (offset_rad, iterations) = quadrant_offset(sequence, self.max_iterations)?;
        if offset_rad != 0.0 {
            sequence.iter_mut().for_each(|v| *v += offset_rad);
        }
        let flipped = self.apply_sign_flip && flip_if_positive(sequence, self.reference_indices);
        Ok(CorrectionOutcome {
            offset_rad,
            iterations,
            flipped,
        })
    }
}

/// Sign-flip reference samples for a grid of `samples` points
///
/// The canonical indices (95, 100) of 150 are scaled to the grid. The
/// contralateral variant is shifted by half a cycle, modulo the grid length.
pub fn reference_indices(samples: usize, role: Role) -> (usize, usize) {
    let last = samples.saturating_sub(1);
    let scale = |i: usize| {
        if samples == CANONICAL_SAMPLES {
            i
        } else {
            ((i * samples) as f64 / CANONICAL_SAMPLES as f64).round() as usize
        }
        .min(last)
    };
    let (a, b) = (
        scale(SIGN_REFERENCE_INDICES.0),
        scale(SIGN_REFERENCE_INDICES.1),
    );
    match role {
        Role::Ipsi => (a, b),
        Role::Contra if samples > 0 => ((a + samples / 2) % samples, (b + samples / 2) % samples),
        Role::Contra => (a, b),
    }
}

/// Multiple of 90° that brings the first sample into `[-50°, 50°]`
fn quadrant_offset(sequence: &[f64], max_iterations: usize) -> Result<(f64, usize), ComputeError> {
    let Some(&first) = sequence.first() else {
        return Ok((0.0, 0));
    };
    let mut v = first;
    let mut offset = 0.0;
    let mut iterations = 0;

    let mut step = |v: &mut f64, delta: f64| -> Result<(), ComputeError> {
        if iterations >= max_iterations {
            return Err(ComputeError::CorrectionDidNotConverge {
                iterations,
                first_sample_rad: first,
            });
        }
        *v += delta;
        offset += delta;
        iterations += 1;
        Ok(())
    };

    while v > OFFSET_THRESHOLD_RAD {
        step(&mut v, -FRAC_PI_2)?;
    }
    while v < -OFFSET_THRESHOLD_RAD {
        step(&mut v, FRAC_PI_2)?;
    }
    Ok((offset, iterations))
}

/// Negate the sequence when both reference samples are positive
fn flip_if_positive(sequence: &mut [f64], (a, b): (usize, usize)) -> bool {
    let positive = |i: usize| sequence.get(i).is_some_and(|v| *v > 0.0);
    if positive(a) && positive(b) {
        sequence.iter_mut().for_each(|v| *v = -*v);
        true
    } else {
        false
    }
}

/// Normalize the offset and sign of a resampled foot angle
///
/// Returns `None` when the policy leaves the foot angle untouched.
pub fn correct_foot_angle(
    sequence: &mut [f64],
    role: Role,
    policy: &CorrectionPolicy,
    max_iterations: usize,
) -> Result<Option<CorrectionOutcome>, ComputeError> {
    if !policy.foot_angle_active() {
        return Ok(None);
    }
    OffsetCorrection::foot(sequence.len(), role, max_iterations)
        .apply(sequence)
        .map(Some)
}

/// Remove a 90° multiple from the ankle angle on incline tasks
///
/// Returns `None` when the task or the policy does not call for it.
pub fn correct_incline_ankle(
    sequence: &mut [f64],
    task: &TaskInfo,
    policy: &CorrectionPolicy,
    max_iterations: usize,
) -> Result<Option<CorrectionOutcome>, ComputeError> {
    if !(policy.ankle_incline_offset_active() && task.is_incline()) {
        return Ok(None);
    }
    OffsetCorrection::offset_only(sequence.len(), max_iterations)
        .apply(sequence)
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deg(d: f64) -> f64 {
        d.to_radians()
    }

    fn incline_task() -> TaskInfo {
        TaskInfo {
            task: "incline_walking".to_string(),
            task_id: "incline_10deg".to_string(),
            task_info: String::new(),
            incline_deg: Some(10.0),
        }
    }

    #[test]
    fn test_offset_removal_from_95_degrees() {
        let mut seq: Vec<f64> = (0..150).map(|i| deg(95.0) - 0.001 * i as f64).collect();
        let outcome = OffsetCorrection::offset_only(150, 8).apply(&mut seq).unwrap();
        assert!(outcome.iterations <= 8);
        assert!(seq[0].abs() <= deg(50.0));
        assert!((seq[0] - deg(5.0)).abs() < 1e-12);
        assert!((outcome.offset_rad + FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_offset_removal_negative() {
        let mut seq = vec![deg(-200.0); 150];
        let outcome = OffsetCorrection::offset_only(150, 8).apply(&mut seq).unwrap();
        assert_eq!(outcome.iterations, 2);
        assert!((seq[0] - deg(-20.0)).abs() < 1e-12);
    }

    #[test]
    fn test_in_band_sequence_untouched() {
        let mut seq = vec![deg(30.0); 150];
        let outcome = OffsetCorrection::offset_only(150, 8).apply(&mut seq).unwrap();
        assert_eq!(outcome, CorrectionOutcome::default());
        assert!(seq.iter().all(|v| (*v - deg(30.0)).abs() < 1e-15));
    }

    #[test]
    fn test_non_convergence_is_reported() {
        let mut seq = vec![deg(1000.0); 150];
        let result = OffsetCorrection::offset_only(150, 8).apply(&mut seq);
        assert!(matches!(
            result,
            Err(ComputeError::CorrectionDidNotConverge { iterations: 8, .. })
        ));
        assert!(seq.iter().all(|v| *v == deg(1000.0)));

        let mut seq = vec![f64::INFINITY; 10];
        assert!(OffsetCorrection::offset_only(10, 8).apply(&mut seq).is_err());
    }

    #[test]
    fn test_sign_flip_ipsi() {
        let mut seq = vec![deg(-5.0); 150];
        seq[95] = deg(10.0);
        seq[100] = deg(12.0);
        let expected: Vec<f64> = seq.iter().map(|v| -v).collect();

        let outcome = OffsetCorrection::foot(150, Role::Ipsi, 8).apply(&mut seq).unwrap();
        assert!(outcome.flipped);
        assert_eq!(seq, expected);
    }

    #[test]
    fn test_sign_flip_needs_both_samples_positive() {
        let mut seq = vec![0.0; 150];
        seq[95] = deg(10.0);
        seq[100] = deg(-1.0);
        let outcome = OffsetCorrection::foot(150, Role::Ipsi, 8).apply(&mut seq).unwrap();
        assert!(!outcome.flipped);
        assert_eq!(seq[95], deg(10.0));
    }

    #[test]
    fn test_sign_flip_after_offset_removal() {
        let mut seq = vec![deg(100.0); 150];
        seq[95] = deg(100.0);
        let outcome = OffsetCorrection::foot(150, Role::Ipsi, 8).apply(&mut seq).unwrap();
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.flipped);
        assert!((seq[0] + deg(10.0)).abs() < 1e-12);
    }

    #[test]
    fn test_contra_reference_indices_shifted_half_cycle() {
        assert_eq!(reference_indices(150, Role::Ipsi), (95, 100));
        assert_eq!(reference_indices(150, Role::Contra), (20, 25));
        assert_eq!(reference_indices(300, Role::Ipsi), (190, 200));
        assert_eq!(reference_indices(300, Role::Contra), (40, 50));

        let mut seq = vec![-0.5; 150];
        seq[20] = 0.5;
        seq[25] = 0.6;
        let mut ipsi = seq.clone();
        assert!(!OffsetCorrection::foot(150, Role::Ipsi, 8).apply(&mut ipsi).unwrap().flipped);
        assert!(OffsetCorrection::foot(150, Role::Contra, 8).apply(&mut seq).unwrap().flipped);
    }

    #[test]
    fn test_policy_gates_foot_correction() {
        let mut seq = vec![deg(95.0); 150];
        let outcome =
            correct_foot_angle(&mut seq, Role::Ipsi, &CorrectionPolicy::disabled(), 8).unwrap();
        assert!(outcome.is_none());
        assert_eq!(seq[0], deg(95.0));

        let outcome =
            correct_foot_angle(&mut seq, Role::Ipsi, &CorrectionPolicy::enabled(), 8).unwrap();
        assert!(outcome.is_some());
        assert!(seq[0].abs() <= deg(50.0));
    }

    #[test]
    fn test_incline_ankle_only_on_incline() {
        let policy = CorrectionPolicy::enabled();
        let mut level = incline_task();
        level.task = "level_walking".to_string();
        level.incline_deg = None;

        let mut seq = vec![deg(92.0); 150];
        assert!(correct_incline_ankle(&mut seq, &level, &policy, 8).unwrap().is_none());
        assert_eq!(seq[0], deg(92.0));

        let outcome = correct_incline_ankle(&mut seq, &incline_task(), &policy, 8)
            .unwrap()
            .unwrap();
        assert!(!outcome.flipped);
        assert!((seq[0] - deg(2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_incline_ankle_individually_toggleable() {
        let policy = CorrectionPolicy {
            ankle_incline_offset: false,
            ..CorrectionPolicy::enabled()
        };
        let mut seq = vec![deg(92.0); 150];
        assert!(correct_incline_ankle(&mut seq, &incline_task(), &policy, 8)
            .unwrap()
            .is_none());
    }
}
