//! Health predictions
//!
//! Linear extrapolation of the composite health score with qualitative risk
//! factors and recommendations attached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::metrics::HealthMetricSample;
use super::trend::linear_regression;

const PREDICTED_WARNING: f64 = 0.6;
const PREDICTED_CRITICAL: f64 = 0.3;
const ERROR_RATE_RISK: f64 = 0.1;
const QUEUE_DEPTH_RISK: f64 = 5.0;

/// Extrapolated health for one horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthPrediction {
    pub agent_id: String,
    pub horizon_minutes: u32,
    pub predicted_score: f64,
    pub confidence: f64,
    pub risk_factors: Vec<String>,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl HealthPrediction {
    pub fn is_at_risk(&self) -> bool {
        !self.risk_factors.is_empty()
    }
}

/// Predict health `horizon_minutes` ahead.
///
/// `scores` are the composite scores of the most recent samples, oldest
/// first, spaced `sample_interval_minutes` apart. Returns `None` when fewer
/// than `min_samples` scores are available.
pub fn predict_health(
    latest: &HealthMetricSample,
    scores: &[f64],
    horizon_minutes: u32,
    sample_interval_minutes: u32,
    min_samples: usize,
) -> Option<HealthPrediction> {
    if scores.len() < min_samples.max(2) {
        return None;
    }
    let fit = linear_regression(scores)?;

    let steps = horizon_minutes as f64 / sample_interval_minutes.max(1) as f64;
    let last_x = (scores.len() - 1) as f64;
    let predicted_score = fit.project(last_x + steps).clamp(0.0, 1.0);

    let mut risk_factors = Vec::new();
    let mut recommendations = Vec::new();

    if predicted_score < PREDICTED_CRITICAL {
        risk_factors.push(format!(
            "Health projected to reach critical level ({:.2}) within {} minutes",
            predicted_score, horizon_minutes
        ));
        recommendations.push("Prepare failover and schedule immediate intervention".to_string());
    } else if predicted_score < PREDICTED_WARNING {
        risk_factors.push(format!(
            "Health projected to decline to {:.2} within {} minutes",
            predicted_score, horizon_minutes
        ));
        recommendations.push("Monitor closely and consider preventive throttling".to_string());
    }

    if latest.error_rate > ERROR_RATE_RISK {
        risk_factors.push(format!("Elevated error rate ({:.1}%)", latest.error_rate * 100.0));
        recommendations.push("Investigate recent failures and error sources".to_string());
    }

    if latest.queue_depth > QUEUE_DEPTH_RISK {
        risk_factors.push(format!("Task queue building up ({:.0} queued)", latest.queue_depth));
        recommendations.push("Redistribute queued tasks or add capacity".to_string());
    }

    Some(HealthPrediction {
        agent_id: latest.agent_id.clone(),
        horizon_minutes,
        predicted_score,
        confidence: fit.r_squared.clamp(0.0, 1.0),
        risk_factors,
        recommendations,
        generated_at: Utc::now(),
    })
}
