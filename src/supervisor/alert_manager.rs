//! Health Alerts
//!
//! Threshold rules evaluated against each agent's latest sample, plus the
//! per-agent alert book that deduplicates, snoozes and resolves them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::metrics::HealthMetricSample;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational - log only
    Info,
    /// Warning - degradation worth watching
    Warning,
    /// Critical - agent needs intervention
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What an alert is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSubject {
    HealthScore,
    ErrorRate,
    ResponseTime,
    QueueDepth,
    /// Raised by the recovery system rather than a threshold rule
    Recovery,
}

pub const MSG_HEALTH_CRITICAL: &str = "Agent health critically low";
pub const MSG_HEALTH_DECLINING: &str = "Agent health declining";
pub const MSG_ERROR_RATE_CRITICAL: &str = "Error rate critically high";
pub const MSG_ERROR_RATE_ELEVATED: &str = "Error rate elevated";
pub const MSG_RESPONSE_TIME_CRITICAL: &str = "Response time critically high";
pub const MSG_RESPONSE_TIME_ELEVATED: &str = "Response time elevated";
pub const MSG_QUEUE_CRITICAL: &str = "Task queue critically deep";
pub const MSG_QUEUE_ELEVATED: &str = "Task queue backing up";

/// An alert raised for an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAlert {
    pub id: String,
    pub agent_id: String,
    pub severity: AlertSeverity,
    pub subject: AlertSubject,
    pub message: String,
    /// Observed value that crossed the threshold
    pub value: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl HealthAlert {
    /// Create a new unresolved alert
    pub fn new(
        agent_id: &str,
        severity: AlertSeverity,
        subject: AlertSubject,
        message: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            severity,
            subject,
            message: message.to_string(),
            value: None,
            timestamp,
            resolved: false,
            resolved_at: None,
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Placeholder trigger used when recovery runs without an active alert
    pub fn recovery_trigger(agent_id: &str) -> Self {
        Self::new(
            agent_id,
            AlertSeverity::Info,
            AlertSubject::Recovery,
            "Automated recovery trigger",
            Utc::now(),
        )
    }

    fn matches(&self, severity: AlertSeverity, message: &str) -> bool {
        !self.resolved && self.severity == severity && self.message == message
    }

    fn resolve(&mut self, at: DateTime<Utc>) {
        self.resolved = true;
        self.resolved_at = Some(at);
    }
}

/// A threshold crossing found in a sample, before deduplication
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub severity: AlertSeverity,
    pub subject: AlertSubject,
    pub message: &'static str,
    pub value: f64,
}

impl AlertCandidate {
    fn new(severity: AlertSeverity, subject: AlertSubject, message: &'static str, value: f64) -> Self {
        Self {
            severity,
            subject,
            message,
            value,
        }
    }
}

/// Evaluate every threshold rule against a sample and its composite score.
///
/// Each rule yields at most one candidate, the critical one taking
/// precedence over the warning.
pub fn evaluate_rules(sample: &HealthMetricSample, health_score: f64) -> Vec<AlertCandidate> {
    use AlertSeverity::{Critical, Warning};
    use AlertSubject::*;

    let mut candidates = Vec::new();

    if health_score < 0.3 {
        candidates.push(AlertCandidate::new(Critical, HealthScore, MSG_HEALTH_CRITICAL, health_score));
    } else if health_score < 0.6 {
        candidates.push(AlertCandidate::new(Warning, HealthScore, MSG_HEALTH_DECLINING, health_score));
    }

    let error_rate = sample.error_rate;
    if error_rate > 0.2 {
        candidates.push(AlertCandidate::new(Critical, ErrorRate, MSG_ERROR_RATE_CRITICAL, error_rate));
    } else if error_rate > 0.1 {
        candidates.push(AlertCandidate::new(Warning, ErrorRate, MSG_ERROR_RATE_ELEVATED, error_rate));
    }

    let response_time = sample.response_time_ms;
    if response_time > 10_000.0 {
        candidates.push(AlertCandidate::new(
            Critical,
            ResponseTime,
            MSG_RESPONSE_TIME_CRITICAL,
            response_time,
        ));
    } else if response_time > 5_000.0 {
        candidates.push(AlertCandidate::new(
            Warning,
            ResponseTime,
            MSG_RESPONSE_TIME_ELEVATED,
            response_time,
        ));
    }

    let queue_depth = sample.queue_depth;
    if queue_depth > 15.0 {
        candidates.push(AlertCandidate::new(Critical, QueueDepth, MSG_QUEUE_CRITICAL, queue_depth));
    } else if queue_depth > 8.0 {
        candidates.push(AlertCandidate::new(Warning, QueueDepth, MSG_QUEUE_ELEVATED, queue_depth));
    }

    candidates
}

/// Alerts raised for a single agent
#[derive(Debug, Clone)]
pub struct AlertBook {
    alerts: Vec<HealthAlert>,
    capacity: usize,
}

impl AlertBook {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Raise an alert unless an unresolved one with the same severity and
    /// message already exists. Returns the new alert when raised.
    pub fn raise(
        &mut self,
        agent_id: &str,
        candidate: &AlertCandidate,
        now: DateTime<Utc>,
    ) -> Option<HealthAlert> {
        if self
            .alerts
            .iter()
            .any(|a| a.matches(candidate.severity, candidate.message))
        {
            debug!(
                "Suppressing duplicate alert for {}: {}",
                agent_id, candidate.message
            );
            return None;
        }

        let alert = HealthAlert::new(
            agent_id,
            candidate.severity,
            candidate.subject,
            candidate.message,
            now,
        )
        .with_value(candidate.value);

        match alert.severity {
            AlertSeverity::Info => info!("[{}] {} ({:.3})", agent_id, alert.message, candidate.value),
            AlertSeverity::Warning => {
                warn!("[{}] {} ({:.3})", agent_id, alert.message, candidate.value)
            }
            AlertSeverity::Critical => {
                error!("CRITICAL [{}] {} ({:.3})", agent_id, alert.message, candidate.value)
            }
        }

        self.alerts.push(alert.clone());
        self.enforce_capacity();
        Some(alert)
    }

    /// Resolve every unresolved alert older than `staleness`.
    ///
    /// This is a snooze: the condition may still hold.
    pub fn resolve_stale(&mut self, now: DateTime<Utc>, staleness: Duration) -> usize {
        let mut resolved = 0;
        for alert in self.alerts.iter_mut().filter(|a| !a.resolved) {
            if now - alert.timestamp > staleness {
                alert.resolve(now);
                resolved += 1;
            }
        }
        if resolved > 0 {
            debug!("Auto-resolved {} stale alerts", resolved);
        }
        resolved
    }

    /// Resolve a specific alert; false if unknown or already resolved
    pub fn resolve(&mut self, alert_id: &str, now: DateTime<Utc>) -> bool {
        match self
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id && !a.resolved)
        {
            Some(alert) => {
                alert.resolve(now);
                true
            }
            None => false,
        }
    }

    pub fn unresolved(&self) -> Vec<HealthAlert> {
        self.alerts.iter().filter(|a| !a.resolved).cloned().collect()
    }

    pub fn all(&self) -> &[HealthAlert] {
        &self.alerts
    }

    /// Drop the oldest resolved alerts first, then the oldest overall
    fn enforce_capacity(&mut self) {
        while self.alerts.len() > self.capacity {
            let victim = self
                .alerts
                .iter()
                .position(|a| a.resolved)
                .unwrap_or(0);
            self.alerts.remove(victim);
        }
    }
}
