//! Agent metric samples and composite health scoring

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response time at which the response-time sub-score reaches zero
pub const RESPONSE_TIME_CEILING_MS: f64 = 5_000.0;
/// Queue depth at which the queue sub-score reaches zero
pub const QUEUE_DEPTH_CEILING: f64 = 10.0;

const RESPONSE_TIME_WEIGHT: f64 = 0.25;
const ERROR_RATE_WEIGHT: f64 = 0.30;
const COMPLETION_WEIGHT: f64 = 0.25;
const QUEUE_DEPTH_WEIGHT: f64 = 0.20;

/// One periodic metric sample reported for an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthMetricSample {
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    /// Mean response time in milliseconds
    pub response_time_ms: f64,
    /// Fraction of failed requests (0-1)
    pub error_rate: f64,
    /// Fraction of tasks completed (0-1)
    pub task_completion_rate: f64,
    /// Tasks waiting on the agent
    pub queue_depth: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_latency_ms: Option<f64>,
}

impl HealthMetricSample {
    /// Create a sample stamped with the current time
    pub fn new(
        agent_id: impl Into<String>,
        response_time_ms: f64,
        error_rate: f64,
        task_completion_rate: f64,
        queue_depth: f64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            timestamp: Utc::now(),
            response_time_ms,
            error_rate,
            task_completion_rate,
            queue_depth,
            cpu_usage: None,
            memory_usage: None,
            network_latency_ms: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_resources(mut self, cpu_usage: f64, memory_usage: f64) -> Self {
        self.cpu_usage = Some(cpu_usage);
        self.memory_usage = Some(memory_usage);
        self
    }

    pub fn with_network_latency(mut self, latency_ms: f64) -> Self {
        self.network_latency_ms = Some(latency_ms);
        self
    }

    /// Composite health score in [0, 1]
    pub fn health_score(&self) -> f64 {
        let response = unit(1.0 - self.response_time_ms / RESPONSE_TIME_CEILING_MS);
        let errors = unit(1.0 - self.error_rate);
        let completion = unit(self.task_completion_rate);
        let queue = unit(1.0 - self.queue_depth / QUEUE_DEPTH_CEILING);

        let score = response * RESPONSE_TIME_WEIGHT
            + errors * ERROR_RATE_WEIGHT
            + completion * COMPLETION_WEIGHT
            + queue * QUEUE_DEPTH_WEIGHT;
        unit(score)
    }
}

/// Clamp to [0, 1]; non-finite values score zero
fn unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// The metrics that trends are fitted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthMetric {
    ResponseTime,
    ErrorRate,
    TaskCompletionRate,
    QueueDepth,
}

impl HealthMetric {
    pub const ALL: [HealthMetric; 4] = [
        HealthMetric::ResponseTime,
        HealthMetric::ErrorRate,
        HealthMetric::TaskCompletionRate,
        HealthMetric::QueueDepth,
    ];

    /// Read this metric from a sample
    pub fn value(&self, sample: &HealthMetricSample) -> f64 {
        match self {
            HealthMetric::ResponseTime => sample.response_time_ms,
            HealthMetric::ErrorRate => sample.error_rate,
            HealthMetric::TaskCompletionRate => sample.task_completion_rate,
            HealthMetric::QueueDepth => sample.queue_depth,
        }
    }

    /// Whether a falling value means the agent is getting better
    pub fn lower_is_better(&self) -> bool {
        !matches!(self, HealthMetric::TaskCompletionRate)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthMetric::ResponseTime => "response_time",
            HealthMetric::ErrorRate => "error_rate",
            HealthMetric::TaskCompletionRate => "task_completion_rate",
            HealthMetric::QueueDepth => "queue_depth",
        }
    }
}

impl std::fmt::Display for HealthMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_sample_scores_one() {
        let sample = HealthMetricSample::new("a", 0.0, 0.0, 1.0, 0.0);
        assert!((sample.health_score() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_blend() {
        // rt 2500 -> 0.5, err 0.1 -> 0.9, completion 0.8, queue 5 -> 0.5
        let sample = HealthMetricSample::new("a", 2500.0, 0.1, 0.8, 5.0);
        let expected = 0.5 * 0.25 + 0.9 * 0.30 + 0.8 * 0.25 + 0.5 * 0.20;
        assert!((sample.health_score() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_pathological_inputs_stay_in_range() {
        let cases = [
            HealthMetricSample::new("a", -100.0, -3.0, 7.0, -50.0),
            HealthMetricSample::new("a", 1e12, 5.0, -2.0, 1e9),
            HealthMetricSample::new("a", f64::NAN, f64::INFINITY, f64::NAN, f64::NEG_INFINITY),
        ];
        for sample in cases {
            let score = sample.health_score();
            assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
        }
    }

    #[test]
    fn test_metric_direction_semantics() {
        assert!(HealthMetric::ErrorRate.lower_is_better());
        assert!(HealthMetric::QueueDepth.lower_is_better());
        assert!(HealthMetric::ResponseTime.lower_is_better());
        assert!(!HealthMetric::TaskCompletionRate.lower_is_better());
    }
}
