//! Angular velocity estimation
//!
//! Both strategies share one finite-difference operator: first-order centered
//! differences inside the series, one-sided differences at the two ends.

use crate::config::VelocityStrategy;
use crate::resample::resample;

/// Derivative of `series` sampled at `rate_hz`
///
/// Series shorter than two samples have no defined slope and yield zeros.
pub fn gradient(series: &[f64], rate_hz: f64) -> Vec<f64> {
    let n = series.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let mut out = Vec::with_capacity(n);
    out.push((series[1] - series[0]) * rate_hz);
    for i in 1..n - 1 {
        out.push((series[i + 1] - series[i - 1]) * rate_hz / 2.0);
    }
    out.push((series[n - 1] - series[n - 2]) * rate_hz);
    out
}

/// Velocity estimator bound to one strategy
#[derive(Debug, Clone, Copy)]
pub struct VelocityEstimator {
    pub strategy: VelocityStrategy,
    pub samples: usize,
}

impl VelocityEstimator {
    pub fn new(strategy: VelocityStrategy, samples: usize) -> Self {
        Self { strategy, samples }
    }

    /// Differentiate an N-point stride series at `N / duration_s`
    pub fn post_resample(resampled: &[f64], duration_s: f64) -> Vec<f64> {
        let effective_rate = resampled.len() as f64 / duration_s;
        gradient(resampled, effective_rate)
    }

    /// Differentiate the raw window at its sampling rate, then resample
    pub fn native_rate(raw: &[f64], rate_hz: f64, samples: usize) -> Vec<f64> {
        resample(&gradient(raw, rate_hz), samples)
    }

    /// Velocity of a channel that is available both raw and resampled
    pub fn estimate(&self, resampled: &[f64], raw: &[f64], rate_hz: f64, duration_s: f64) -> Vec<f64> {
        match self.strategy {
            VelocityStrategy::PostResample => Self::post_resample(resampled, duration_s),
            VelocityStrategy::NativeRate => Self::native_rate(raw, rate_hz, self.samples),
        }
    }

    /// Velocity of a series that only exists on the phase grid (derived segments)
    pub fn estimate_derived(&self, resampled: &[f64], duration_s: f64) -> Vec<f64> {
        Self::post_resample(resampled, duration_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_linear() {
        let series: Vec<f64> = (0..10).map(|i| 2.0 * i as f64).collect();
        let slope = gradient(&series, 100.0);
        assert!(slope.iter().all(|v| (v - 200.0).abs() < 1e-9));
    }

    #[test]
    fn test_gradient_boundaries_one_sided() {
        let series = [0.0, 1.0, 4.0, 9.0];
        let slope = gradient(&series, 1.0);
        assert_eq!(slope, vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_gradient_short_series() {
        assert_eq!(gradient(&[3.0], 100.0), vec![0.0]);
        assert!(gradient(&[], 100.0).is_empty());
    }

    #[test]
    fn test_post_resample_rate() {
        // Ramp rising by 1 rad per sample over a 1.5 s stride of 150 samples
        let ramp: Vec<f64> = (0..150).map(|i| i as f64).collect();
        let velocity = VelocityEstimator::post_resample(&ramp, 1.5);
        assert!(velocity.iter().all(|v| (v - 100.0).abs() < 1e-9));
    }

    #[test]
    fn test_strategies_agree_on_linear_motion() {
        // 0.5 rad/s over a 1 s window sampled at 100 Hz
        let raw: Vec<f64> = (0..=100).map(|i| 0.5 * i as f64 / 100.0).collect();
        let resampled = resample(&raw, 150);

        let native = VelocityEstimator::new(VelocityStrategy::NativeRate, 150)
            .estimate(&resampled, &raw, 100.0, 1.0);
        assert_eq!(native.len(), 150);
        assert!(native.iter().all(|v| (v - 0.5).abs() < 1e-9));

        // The post-resample operator uses N / duration as its rate
        let post = VelocityEstimator::new(VelocityStrategy::PostResample, 150)
            .estimate(&resampled, &raw, 100.0, 1.0);
        let expected = 0.5 * 150.0 / 149.0;
        assert!(post.iter().all(|v| (v - expected).abs() < 1e-9));
    }

    #[test]
    fn test_constant_has_zero_velocity() {
        let flat = vec![0.3; 150];
        let v = VelocityEstimator::new(VelocityStrategy::PostResample, 150).estimate_derived(&flat, 1.2);
        assert!(v.iter().all(|x| x.abs() < 1e-12));
    }
}
