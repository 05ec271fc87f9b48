//! Kinematic chain
//!
//! Derives sagittal segment angles from corrected joint angles:
//!
//! ```text
//! shank = foot - ankle_dorsiflexion
//! thigh = shank + knee_flexion
//! pelvis = thigh - hip_flexion        (only when no measured pelvis is used)
//! ```
//!
//! Inside the chain the knee is always flexion-positive. The knee column of
//! the output table may use the opposite sign; that negation happens once, in
//! [`AngleSign::to_output`], at the assembly boundary.

use crate::error::ComputeError;
use serde::{Deserialize, Serialize};

/// Sign convention of a joint-angle output column relative to the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleSign {
    #[default]
    FlexionPositive,
    ExtensionPositive,
}

impl AngleSign {
    /// Convert a flexion-positive chain series to this output convention
    pub fn to_output(&self, chain: &[f64]) -> Vec<f64> {
        match self {
            AngleSign::FlexionPositive => chain.to_vec(),
            AngleSign::ExtensionPositive => chain.iter().map(|v| -v).collect(),
        }
    }
}

/// Corrected, resampled joint angles for one leg (rad)
#[derive(Debug, Clone, Copy)]
pub struct ChainInputs<'a> {
    pub foot: &'a [f64],
    pub ankle_dorsiflexion: &'a [f64],
    /// Flexion-positive knee angle
    pub knee_flexion: &'a [f64],
    pub hip_flexion: Option<&'a [f64]>,
    /// Pelvis angle from its own channel, used as-is when present
    pub measured_pelvis: Option<&'a [f64]>,
}

/// Segment angles derived for one leg (rad)
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentAngles {
    pub foot: Vec<f64>,
    pub shank: Vec<f64>,
    pub thigh: Vec<f64>,
    pub pelvis: Option<Vec<f64>>,
    /// True when `pelvis` came from the measured channel
    pub pelvis_measured: bool,
}

/// Kinematic chain calculator
pub struct KinematicChain;

impl KinematicChain {
    pub fn compute(inputs: ChainInputs<'_>) -> Result<SegmentAngles, ComputeError> {
        let n = inputs.foot.len();
        check_len("ankle_dorsiflexion", inputs.ankle_dorsiflexion, n)?;
        check_len("knee_flexion", inputs.knee_flexion, n)?;

        let foot = inputs.foot.to_vec();
        let shank = Self::shank(&foot, inputs.ankle_dorsiflexion);
        let thigh = Self::thigh(&shank, inputs.knee_flexion);

        let (pelvis, pelvis_measured) = match (inputs.measured_pelvis, inputs.hip_flexion) {
            (Some(measured), _) => {
                check_len("pelvis", measured, n)?;
                (Some(measured.to_vec()), true)
            }
            (None, Some(hip)) => {
                check_len("hip_flexion", hip, n)?;
                (Some(Self::pelvis(&thigh, hip)), false)
            }
            (None, None) => (None, false),
        };

        Ok(SegmentAngles {
            foot,
            shank,
            thigh,
            pelvis,
            pelvis_measured,
        })
    }

    pub fn shank(foot: &[f64], ankle_dorsiflexion: &[f64]) -> Vec<f64> {
        foot.iter()
            .zip(ankle_dorsiflexion)
            .map(|(f, a)| f - a)
            .collect()
    }

    pub fn thigh(shank: &[f64], knee_flexion: &[f64]) -> Vec<f64> {
        shank.iter().zip(knee_flexion).map(|(s, k)| s + k).collect()
    }

    /// Pelvis reconstructed from the chain
    pub fn pelvis(thigh: &[f64], hip_flexion: &[f64]) -> Vec<f64> {
        thigh.iter().zip(hip_flexion).map(|(t, h)| t - h).collect()
    }
}

fn check_len(name: &str, series: &[f64], expected: usize) -> Result<(), ComputeError> {
    if series.len() != expected {
        return Err(ComputeError::InvalidTrial(format!(
            "{name} has {} samples, expected {expected}",
            series.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deg(d: f64) -> f64 {
        d.to_radians()
    }

    #[test]
    fn test_chain_values() {
        let foot = vec![deg(10.0); 4];
        let ankle = vec![deg(5.0); 4];
        let knee = vec![deg(30.0); 4];
        let hip = vec![deg(20.0); 4];

        let angles = KinematicChain::compute(ChainInputs {
            foot: &foot,
            ankle_dorsiflexion: &ankle,
            knee_flexion: &knee,
            hip_flexion: Some(&hip),
            measured_pelvis: None,
        })
        .unwrap();

        assert!((angles.shank[0] - deg(5.0)).abs() < 1e-12);
        assert!((angles.thigh[0] - deg(35.0)).abs() < 1e-12);
        let pelvis = angles.pelvis.unwrap();
        assert!((pelvis[3] - deg(15.0)).abs() < 1e-12);
        assert!(!angles.pelvis_measured);
    }

    #[test]
    fn test_measured_pelvis_preferred() {
        let series = vec![0.1; 3];
        let pelvis = vec![0.7; 3];
        let angles = KinematicChain::compute(ChainInputs {
            foot: &series,
            ankle_dorsiflexion: &series,
            knee_flexion: &series,
            hip_flexion: Some(&series),
            measured_pelvis: Some(&pelvis),
        })
        .unwrap();
        assert_eq!(angles.pelvis, Some(pelvis));
        assert!(angles.pelvis_measured);
    }

    #[test]
    fn test_knee_output_sign_is_independent_of_chain() {
        let series = vec![0.0; 3];
        let knee = vec![deg(30.0); 3];
        let angles = KinematicChain::compute(ChainInputs {
            foot: &series,
            ankle_dorsiflexion: &series,
            knee_flexion: &knee,
            hip_flexion: None,
            measured_pelvis: None,
        })
        .unwrap();

        // The chain always adds a flexion-positive knee
        assert!((angles.thigh[0] - deg(30.0)).abs() < 1e-12);
        assert_eq!(AngleSign::FlexionPositive.to_output(&knee), knee);
        let extension = AngleSign::ExtensionPositive.to_output(&knee);
        assert!((extension[0] + deg(30.0)).abs() < 1e-12);
        assert_eq!(angles.pelvis, None);
    }

    #[test]
    fn test_length_mismatch() {
        let a = vec![0.0; 3];
        let b = vec![0.0; 4];
        let result = KinematicChain::compute(ChainInputs {
            foot: &a,
            ankle_dorsiflexion: &b,
            knee_flexion: &a,
            hip_flexion: None,
            measured_pelvis: None,
        });
        assert!(result.is_err());
    }
}
