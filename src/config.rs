//! Pipeline configuration
//!
//! Every run is driven by an explicit [`PipelineConfig`] value. There is no
//! process-wide state: the correction policy is handed to each transform call.

use crate::error::ComputeError;
use crate::kinematics::AngleSign;
use serde::{Deserialize, Serialize};

/// Canonical number of phase samples per stride
pub const DEFAULT_SAMPLES_PER_STRIDE: usize = 150;

/// Default bound on offset-removal iterations
pub const DEFAULT_MAX_OFFSET_ITERATIONS: usize = 8;

/// Switches for the data-fix corrections
///
/// Individual switches only take effect while `enable_data_fixes` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionPolicy {
    pub enable_data_fixes: bool,
    /// Foot angle 90° offset removal and sign flip
    pub foot_angle: bool,
    /// Ankle 90° offset removal on incline tasks
    pub ankle_incline_offset: bool,
    /// Take the pelvis angle from its own channel instead of the chain
    pub measured_pelvis: bool,
}

impl Default for CorrectionPolicy {
    fn default() -> Self {
        Self::enabled()
    }
}

impl CorrectionPolicy {
    pub fn enabled() -> Self {
        Self {
            enable_data_fixes: true,
            foot_angle: true,
            ankle_incline_offset: true,
            measured_pelvis: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enable_data_fixes: false,
            ..Self::enabled()
        }
    }

    pub fn foot_angle_active(&self) -> bool {
        self.enable_data_fixes && self.foot_angle
    }

    pub fn ankle_incline_offset_active(&self) -> bool {
        self.enable_data_fixes && self.ankle_incline_offset
    }

    pub fn measured_pelvis_active(&self) -> bool {
        self.enable_data_fixes && self.measured_pelvis
    }
}

/// Temporal domain angular velocities are differentiated in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityStrategy {
    /// Differentiate the N-point series at `N / duration_s`
    #[default]
    PostResample,
    /// Differentiate the raw series at its sampling rate, then resample
    NativeRate,
}

impl VelocityStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            VelocityStrategy::PostResample => "post_resample",
            VelocityStrategy::NativeRate => "native_rate",
        }
    }
}

/// Configuration for a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Phase samples per stride (N)
    pub samples_per_stride: usize,
    pub corrections: CorrectionPolicy,
    pub velocity_strategy: VelocityStrategy,
    /// Divide joint moments by body mass when it is known
    pub normalize_moments_by_mass: bool,
    pub max_offset_iterations: usize,
    /// Sign convention of the knee angle output columns
    pub knee_angle_output: AngleSign,
    /// Worker threads, 0 uses the rayon default
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            samples_per_stride: DEFAULT_SAMPLES_PER_STRIDE,
            corrections: CorrectionPolicy::default(),
            velocity_strategy: VelocityStrategy::default(),
            normalize_moments_by_mass: true,
            max_offset_iterations: DEFAULT_MAX_OFFSET_ITERATIONS,
            knee_angle_output: AngleSign::FlexionPositive,
            workers: 0,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        serde_json::to_string_pretty(self).map_err(ComputeError::JsonError)
    }

    pub fn with_corrections(mut self, corrections: CorrectionPolicy) -> Self {
        self.corrections = corrections;
        self
    }

    pub fn with_samples_per_stride(mut self, samples: usize) -> Self {
        self.samples_per_stride = samples;
        self
    }

    pub fn with_velocity_strategy(mut self, strategy: VelocityStrategy) -> Self {
        self.velocity_strategy = strategy;
        self
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.samples_per_stride < 2 {
            return Err(ComputeError::InvalidConfig(format!(
                "samples_per_stride must be at least 2, got {}",
                self.samples_per_stride
            )));
        }
        if self.max_offset_iterations == 0 {
            return Err(ComputeError::InvalidConfig(
                "max_offset_iterations must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.samples_per_stride, 150);
        assert_eq!(config.velocity_strategy, VelocityStrategy::PostResample);
        assert!(config.corrections.foot_angle_active());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_disabled_policy_gates_every_fix() {
        let policy = CorrectionPolicy::disabled();
        assert!(policy.foot_angle);
        assert!(!policy.foot_angle_active());
        assert!(!policy.ankle_incline_offset_active());
        assert!(!policy.measured_pelvis_active());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = PipelineConfig::from_json(
            r#"{"samples_per_stride": 101, "corrections": {"enable_data_fixes": false}}"#,
        )
        .unwrap();
        assert_eq!(config.samples_per_stride, 101);
        assert!(!config.corrections.enable_data_fixes);
        assert!(config.corrections.foot_angle);
        assert_eq!(config.max_offset_iterations, 8);
    }

    #[test]
    fn test_json_round_trip() {
        let config = PipelineConfig::default()
            .with_velocity_strategy(VelocityStrategy::NativeRate)
            .with_samples_per_stride(200);
        let json = config.to_json().unwrap();
        assert_eq!(PipelineConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(PipelineConfig::from_json(r#"{"samples_per_stride": 1}"#).is_err());
        assert!(PipelineConfig::from_json(r#"{"max_offset_iterations": 0}"#).is_err());
    }
}
