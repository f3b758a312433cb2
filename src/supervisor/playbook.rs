//! Recovery Playbook
//!
//! Catalogue of recovery strategies, each an ordered list of actions guarded
//! by an applicability predicate. Strategies are tried most severe first and
//! the first match wins.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::actions::{ActionSeverity, RecoveryAction};
use super::alert_manager::{AlertSeverity, AlertSubject, HealthAlert};
use super::health_monitor::AgentHealthStatus;
use crate::coordination::{CircuitBreakerStatus, CircuitState};

/// Fleet-wide figures captured when a recovery is evaluated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub total_agents: usize,
    pub healthy_agents: usize,
    /// Healthy agents other than the target, healthiest first
    pub healthy_peers: Vec<String>,
    pub total_queue_depth: f64,
    pub available_capacity: u32,
}

/// Everything a strategy predicate and its actions may look at
#[derive(Debug, Clone)]
pub struct RecoveryContext {
    pub agent_id: String,
    pub health: AgentHealthStatus,
    pub circuit: CircuitBreakerStatus,
    /// Most severe, then most recent, unresolved alert
    pub trigger: HealthAlert,
    pub system: SystemSnapshot,
}

impl RecoveryContext {
    /// Choose the alert that stands for this recovery
    pub fn select_trigger(agent_id: &str, alerts: &[HealthAlert]) -> HealthAlert {
        alerts
            .iter()
            .filter(|a| !a.resolved)
            .max_by(|a, b| {
                a.severity
                    .cmp(&b.severity)
                    .then_with(|| a.timestamp.cmp(&b.timestamp))
            })
            .cloned()
            .unwrap_or_else(|| HealthAlert::recovery_trigger(agent_id))
    }

    fn error_rate(&self) -> f64 {
        self.health.latest.error_rate
    }

    fn queue_depth(&self) -> f64 {
        self.health.latest.queue_depth
    }
}

type Predicate = fn(&RecoveryContext) -> bool;

/// Named, cooled-down sequence of recovery actions
#[derive(Clone)]
pub struct RecoveryStrategy {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub cooldown: Duration,
    pub actions: Vec<RecoveryAction>,
    applies: Predicate,
}

impl std::fmt::Debug for RecoveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryStrategy")
            .field("id", &self.id)
            .field("cooldown", &self.cooldown)
            .field("actions", &self.actions)
            .finish_non_exhaustive()
    }
}

impl RecoveryStrategy {
    pub fn new(
        id: &'static str,
        name: &'static str,
        description: &'static str,
        cooldown: Duration,
        actions: Vec<RecoveryAction>,
        applies: Predicate,
    ) -> Self {
        Self {
            id,
            name,
            description,
            cooldown,
            actions,
            applies,
        }
    }

    pub fn applies_to(&self, context: &RecoveryContext) -> bool {
        (self.applies)(context)
    }

    /// Severity of the most disruptive action
    pub fn max_severity(&self) -> ActionSeverity {
        self.actions
            .iter()
            .map(|a| a.severity)
            .max()
            .unwrap_or(ActionSeverity::Low)
    }
}

/// Health score below 0.3, or an unresolved Critical health-score or
/// response-time alert. Critical error-rate and queue-depth alerts do not
/// count here; they route to `high_error_rate` and `queue_overload`.
fn critical_failure(ctx: &RecoveryContext) -> bool {
    ctx.health.health_score < 0.3
        || ctx.health.alerts.iter().any(|a| {
            !a.resolved
                && a.severity == AlertSeverity::Critical
                && matches!(a.subject, AlertSubject::HealthScore | AlertSubject::ResponseTime)
        })
}

fn high_error_rate(ctx: &RecoveryContext) -> bool {
    ctx.error_rate() > 0.15
}

fn queue_overload(ctx: &RecoveryContext) -> bool {
    ctx.queue_depth() > 10.0
}

fn performance_degradation(ctx: &RecoveryContext) -> bool {
    ctx.health.health_score < 0.6 && ctx.health.has_degrading_trend()
}

fn circuit_open(ctx: &RecoveryContext) -> bool {
    ctx.circuit.state == CircuitState::Open
}

/// The built-in strategy catalogue, in declaration order
pub fn default_strategies() -> Vec<RecoveryStrategy> {
    vec![
        RecoveryStrategy::new(
            "critical_failure",
            "Critical Failure Recovery",
            "Move work off a failing agent, restart it and fail over if needed",
            Duration::seconds(900),
            vec![
                RecoveryAction::task_redistribute(),
                RecoveryAction::agent_restart(),
                RecoveryAction::failover(),
            ],
            critical_failure,
        ),
        RecoveryStrategy::new(
            "high_error_rate",
            "High Error Rate Recovery",
            "Throttle, reset the circuit and restart an erroring agent",
            Duration::seconds(450),
            vec![
                RecoveryAction::request_throttle(),
                RecoveryAction::circuit_reset(),
                RecoveryAction::agent_restart(),
            ],
            high_error_rate,
        ),
        RecoveryStrategy::new(
            "queue_overload",
            "Queue Overload Recovery",
            "Drain a backed-up queue to peers and add capacity",
            Duration::seconds(300),
            vec![
                RecoveryAction::task_redistribute(),
                RecoveryAction::resource_scale(),
            ],
            queue_overload,
        ),
        RecoveryStrategy::new(
            "performance_degradation",
            "Performance Degradation Recovery",
            "Ease load on a steadily degrading agent",
            Duration::seconds(600),
            vec![
                RecoveryAction::request_throttle(),
                RecoveryAction::task_redistribute(),
            ],
            performance_degradation,
        ),
        RecoveryStrategy::new(
            "circuit_breaker_recovery",
            "Circuit Breaker Recovery",
            "Close an open circuit so the agent receives traffic again",
            Duration::seconds(300),
            vec![RecoveryAction::circuit_reset()],
            circuit_open,
        ),
    ]
}

/// Strategy catalogue ordered by priority
#[derive(Debug, Clone)]
pub struct RecoveryPlaybook {
    strategies: Vec<RecoveryStrategy>,
}

impl Default for RecoveryPlaybook {
    fn default() -> Self {
        Self::new(default_strategies())
    }
}

impl RecoveryPlaybook {
    /// Build a playbook; ties in severity keep the given order
    pub fn new(mut strategies: Vec<RecoveryStrategy>) -> Self {
        strategies.sort_by_key(|s| std::cmp::Reverse(s.max_severity()));
        Self { strategies }
    }

    pub fn strategies(&self) -> &[RecoveryStrategy] {
        &self.strategies
    }

    pub fn get(&self, id: &str) -> Option<&RecoveryStrategy> {
        self.strategies.iter().find(|s| s.id == id)
    }

    /// Highest-priority strategy whose predicate holds
    pub fn select(&self, context: &RecoveryContext) -> Option<&RecoveryStrategy> {
        let selected = self.strategies.iter().find(|s| s.applies_to(context));
        match selected {
            Some(strategy) => debug!(
                "Strategy {} applies to agent {}",
                strategy.id, context.agent_id
            ),
            None => debug!("No recovery strategy applies to agent {}", context.agent_id),
        }
        selected
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::coordination::CircuitBreaker;
    use crate::supervisor::health_monitor::HealthLevel;
    use crate::supervisor::metrics::{HealthMetric, HealthMetricSample};
    use crate::supervisor::trend::{HealthTrend, TrendDirection};
    use chrono::Utc;

    /// Context for a lone agent with the given composite score and a
    /// benign latest sample
    pub(crate) fn context_for(agent_id: &str, health_score: f64) -> RecoveryContext {
        let latest = HealthMetricSample::new(agent_id, 200.0, 0.01, 0.95, 1.0);
        RecoveryContext {
            agent_id: agent_id.to_string(),
            health: AgentHealthStatus {
                agent_id: agent_id.to_string(),
                health_score,
                level: HealthLevel::from_score(health_score),
                last_updated: latest.timestamp,
                latest,
                sample_count: 1,
                trends: Vec::new(),
                alerts: Vec::new(),
                predictions: Vec::new(),
            },
            circuit: CircuitBreaker::new(agent_id, Default::default()).status_at(Utc::now()),
            trigger: HealthAlert::recovery_trigger(agent_id),
            system: SystemSnapshot::default(),
        }
    }

    fn selected(ctx: &RecoveryContext) -> Option<&'static str> {
        RecoveryPlaybook::default().select(ctx).map(|s| s.id)
    }

    #[test]
    fn test_catalogue_priority_order() {
        let playbook = RecoveryPlaybook::default();
        let ids: Vec<&str> = playbook.strategies().iter().map(|s| s.id).collect();
        assert_eq!(
            ids,
            vec![
                "critical_failure",
                "high_error_rate",
                "queue_overload",
                "performance_degradation",
                "circuit_breaker_recovery",
            ]
        );
    }

    #[test]
    fn test_healthy_agent_matches_nothing() {
        assert_eq!(selected(&context_for("a", 0.95)), None);
    }

    #[test]
    fn test_low_health_is_critical() {
        assert_eq!(selected(&context_for("a", 0.2)), Some("critical_failure"));
    }

    #[test]
    fn test_error_rate_beats_queue_overload() {
        let mut ctx = context_for("a", 0.7);
        ctx.health.latest.error_rate = 0.25;
        ctx.health.latest.queue_depth = 12.0;
        ctx.health.alerts.push(HealthAlert::new(
            "a",
            AlertSeverity::Critical,
            AlertSubject::ErrorRate,
            "Error rate critically high",
            Utc::now(),
        ));
        assert_eq!(selected(&ctx), Some("high_error_rate"));
    }

    #[test]
    fn test_critical_response_time_alert_is_critical_failure() {
        let mut ctx = context_for("a", 0.7);
        ctx.health.alerts.push(HealthAlert::new(
            "a",
            AlertSeverity::Critical,
            AlertSubject::ResponseTime,
            "Response time critically high",
            Utc::now(),
        ));
        assert_eq!(selected(&ctx), Some("critical_failure"));
    }

    #[test]
    fn test_degradation_needs_degrading_trend() {
        let mut ctx = context_for("a", 0.5);
        assert_eq!(selected(&ctx), None);

        ctx.health.trends.push(HealthTrend {
            metric: HealthMetric::ResponseTime,
            direction: TrendDirection::Degrading,
            slope: 50.0,
            confidence: 0.9,
        });
        assert_eq!(selected(&ctx), Some("performance_degradation"));
    }

    #[test]
    fn test_open_circuit() {
        let mut ctx = context_for("a", 0.9);
        ctx.circuit.state = CircuitState::Open;
        assert_eq!(selected(&ctx), Some("circuit_breaker_recovery"));
    }

    #[test]
    fn test_trigger_prefers_severity_then_recency() {
        let now = Utc::now();
        let old_critical = HealthAlert::new(
            "a",
            AlertSeverity::Critical,
            AlertSubject::ErrorRate,
            "old",
            now - Duration::minutes(5),
        );
        let new_critical = HealthAlert::new(
            "a",
            AlertSeverity::Critical,
            AlertSubject::QueueDepth,
            "new",
            now,
        );
        let warning = HealthAlert::new(
            "a",
            AlertSeverity::Warning,
            AlertSubject::HealthScore,
            "warn",
            now + Duration::minutes(1),
        );

        let trigger = RecoveryContext::select_trigger(
            "a",
            &[old_critical, new_critical.clone(), warning],
        );
        assert_eq!(trigger.id, new_critical.id);

        let fallback = RecoveryContext::select_trigger("a", &[]);
        assert_eq!(fallback.severity, AlertSeverity::Info);
        assert_eq!(fallback.subject, AlertSubject::Recovery);
    }

    #[test]
    fn test_custom_strategies_sorted_stably() {
        fn always(_: &RecoveryContext) -> bool {
            true
        }
        let playbook = RecoveryPlaybook::new(vec![
            RecoveryStrategy::new(
                "low",
                "Low",
                "",
                Duration::seconds(1),
                vec![RecoveryAction::circuit_reset()],
                always,
            ),
            RecoveryStrategy::new(
                "high_a",
                "High A",
                "",
                Duration::seconds(1),
                vec![RecoveryAction::agent_restart()],
                always,
            ),
            RecoveryStrategy::new(
                "high_b",
                "High B",
                "",
                Duration::seconds(1),
                vec![RecoveryAction::resource_scale()],
                always,
            ),
        ]);
        let ids: Vec<&str> = playbook.strategies().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["high_a", "high_b", "low"]);
        assert_eq!(playbook.select(&context_for("a", 0.9)).map(|s| s.id), Some("high_a"));
    }
}
