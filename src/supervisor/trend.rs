//! Trend detection over recent metric samples
//!
//! Ordinary least-squares fit over sample index, reporting slope, intercept
//! and coefficient of determination.

use serde::{Deserialize, Serialize};

use super::metrics::{HealthMetric, HealthMetricSample};

/// Minimum samples required before a trend is reported
pub const MIN_TREND_SAMPLES: usize = 3;
/// Absolute slope (per sample) at or below which a metric is stable
pub const STABLE_SLOPE_THRESHOLD: f64 = 0.01;

/// Total variance below which a series is treated as constant
const CONSTANT_SERIES_EPSILON: f64 = 1e-12;

/// Result of a least-squares line fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl LinearFit {
    /// Value of the fitted line at `x`
    pub fn project(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Fit `y = intercept + slope * x` with `x = 0, 1, 2, ...`.
///
/// Returns `None` for fewer than two points or non-finite data. A constant
/// series is a perfect fit (R² = 1).
pub fn linear_regression(values: &[f64]) -> Option<LinearFit> {
    let n = values.len();
    if n < 2 || values.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n_f;

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        ss_xy += dx * (y - mean_y);
        ss_xx += dx * dx;
    }

    let slope = ss_xy / ss_xx;
    let intercept = mean_y - slope * mean_x;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (i, y) in values.iter().enumerate() {
        let predicted = intercept + slope * i as f64;
        ss_res += (y - predicted).powi(2);
        ss_tot += (y - mean_y).powi(2);
    }

    let r_squared = if ss_tot < CONSTANT_SERIES_EPSILON {
        1.0
    } else {
        1.0 - ss_res / ss_tot
    };

    Some(LinearFit {
        slope,
        intercept,
        r_squared,
    })
}

/// Direction a metric is moving in, from the agent's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Degrading,
    Stable,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Improving => write!(f, "improving"),
            TrendDirection::Degrading => write!(f, "degrading"),
            TrendDirection::Stable => write!(f, "stable"),
        }
    }
}

/// Fitted trend for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthTrend {
    pub metric: HealthMetric,
    pub direction: TrendDirection,
    pub slope: f64,
    /// R² of the fit, clamped to [0, 1]
    pub confidence: f64,
}

impl HealthTrend {
    pub fn is_degrading(&self) -> bool {
        self.direction == TrendDirection::Degrading
    }
}

fn classify(metric: HealthMetric, slope: f64) -> TrendDirection {
    if slope.abs() <= STABLE_SLOPE_THRESHOLD {
        return TrendDirection::Stable;
    }
    let rising = slope > 0.0;
    if rising == metric.lower_is_better() {
        TrendDirection::Degrading
    } else {
        TrendDirection::Improving
    }
}

/// Fit a trend per metric over the last `window` samples.
///
/// Empty when fewer than [`MIN_TREND_SAMPLES`] samples are available.
pub fn compute_trends<'a, I>(samples: I, window: usize) -> Vec<HealthTrend>
where
    I: ExactSizeIterator<Item = &'a HealthMetricSample>,
{
    let total = samples.len();
    let recent: Vec<&HealthMetricSample> = samples.skip(total.saturating_sub(window)).collect();
    if recent.len() < MIN_TREND_SAMPLES {
        return Vec::new();
    }

    HealthMetric::ALL
        .iter()
        .filter_map(|metric| {
            let values: Vec<f64> = recent.iter().map(|s| metric.value(s)).collect();
            let fit = linear_regression(&values)?;
            Some(HealthTrend {
                metric: *metric,
                direction: classify(*metric, fit.slope),
                slope: fit.slope,
                confidence: fit.r_squared.clamp(0.0, 1.0),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(error_rate: f64, completion: f64) -> HealthMetricSample {
        HealthMetricSample::new("a", 200.0, error_rate, completion, 1.0)
    }

    #[test]
    fn test_regression_exact_line() {
        let fit = linear_regression(&[1.0, 3.0, 5.0, 7.0]).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-9);
        assert!((fit.intercept - 1.0).abs() < 1e-9);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
        assert!((fit.project(4.0) - 9.0).abs() < 1e-9);
    }

    #[test]
    fn test_regression_constant_series() {
        let fit = linear_regression(&[0.5, 0.5, 0.5]).unwrap();
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.r_squared, 1.0);
    }

    #[test]
    fn test_regression_rejects_degenerate_input() {
        assert!(linear_regression(&[]).is_none());
        assert!(linear_regression(&[1.0]).is_none());
        assert!(linear_regression(&[1.0, f64::NAN, 2.0]).is_none());
    }

    #[test]
    fn test_noisy_fit_has_partial_confidence() {
        let fit = linear_regression(&[1.0, 3.0, 2.0, 4.0, 3.0]).unwrap();
        assert!(fit.r_squared > 0.0 && fit.r_squared < 1.0);
    }

    #[test]
    fn test_requires_minimum_samples() {
        let samples = vec![sample(0.1, 0.9), sample(0.2, 0.9)];
        assert!(compute_trends(samples.iter(), 20).is_empty());
    }

    #[test]
    fn test_rising_error_rate_is_degrading() {
        let samples: Vec<_> = (0..5).map(|i| sample(0.02 * i as f64, 0.9)).collect();
        let trends = compute_trends(samples.iter(), 20);
        let error = trends
            .iter()
            .find(|t| t.metric == HealthMetric::ErrorRate)
            .unwrap();
        assert_eq!(error.direction, TrendDirection::Degrading);
        assert!((error.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_rising_completion_is_improving() {
        let samples: Vec<_> = (0..5).map(|i| sample(0.0, 0.5 + 0.1 * i as f64)).collect();
        let trends = compute_trends(samples.iter(), 20);
        let completion = trends
            .iter()
            .find(|t| t.metric == HealthMetric::TaskCompletionRate)
            .unwrap();
        assert_eq!(completion.direction, TrendDirection::Improving);
    }

    #[test]
    fn test_small_slope_is_stable() {
        let samples: Vec<_> = (0..5).map(|i| sample(0.001 * i as f64, 0.9)).collect();
        let trends = compute_trends(samples.iter(), 20);
        assert!(trends.iter().all(|t| t.direction == TrendDirection::Stable));
    }

    #[test]
    fn test_window_uses_most_recent_samples() {
        // Old samples degrade, the last three are flat
        let mut samples: Vec<_> = (0..10).map(|i| sample(0.05 * i as f64, 0.9)).collect();
        samples.extend((0..3).map(|_| sample(0.1, 0.9)));
        let trends = compute_trends(samples.iter(), 3);
        let error = trends
            .iter()
            .find(|t| t.metric == HealthMetric::ErrorRate)
            .unwrap();
        assert_eq!(error.direction, TrendDirection::Stable);
    }
}
