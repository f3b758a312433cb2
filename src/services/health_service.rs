//! Health service facade
//!
//! Single entry point wiring the circuit breaker registry, the health
//! monitor and the recovery system together. Hosts construct one of these
//! and share it behind an `Arc`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::coordination::{CircuitBreakerManager, CircuitBreakerStatus, CircuitState};
use crate::supervisor::{
    AgentHealthStatus, HealthAlert, HealthLevel, HealthMetricSample, HealthMonitor,
    Infrastructure, RecoveryExecution, RecoverySystem, Watchdog,
};

/// Fleet-wide health summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthOverview {
    pub timestamp: DateTime<Utc>,
    pub total_agents: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub critical: usize,
    pub open_circuits: usize,
    pub active_alerts: usize,
}

pub struct HealthService {
    breakers: Arc<CircuitBreakerManager>,
    monitor: Arc<HealthMonitor>,
    recovery: Arc<RecoverySystem>,
}

impl HealthService {
    pub fn new(
        breakers: Arc<CircuitBreakerManager>,
        monitor: Arc<HealthMonitor>,
        recovery: Arc<RecoverySystem>,
    ) -> Self {
        Self {
            breakers,
            monitor,
            recovery,
        }
    }

    /// Build every component from configuration
    pub fn from_config(config: &AppConfig, infra: Infrastructure) -> Self {
        let breakers = Arc::new(CircuitBreakerManager::new(config.circuit_breaker.clone()));
        let monitor = Arc::new(HealthMonitor::new(config.health.clone()));
        let recovery = Arc::new(RecoverySystem::new(
            breakers.clone(),
            monitor.clone(),
            infra,
            config.recovery.clone(),
        ));
        info!("Health service initialized");
        Self::new(breakers, monitor, recovery)
    }

    /// Watchdog sweeping this service's agents
    pub fn watchdog(&self, config: &AppConfig) -> Watchdog {
        Watchdog::new(
            config.watchdog.clone(),
            self.monitor.clone(),
            self.recovery.clone(),
        )
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerManager> {
        &self.breakers
    }

    pub fn monitor(&self) -> &Arc<HealthMonitor> {
        &self.monitor
    }

    pub fn recovery(&self) -> &Arc<RecoverySystem> {
        &self.recovery
    }

    // Circuit breaker

    pub async fn record_agent_outcome(&self, agent_id: &str, success: bool, error: Option<&str>) {
        self.breakers.record_outcome(agent_id, success, error).await;
    }

    pub async fn can_attempt(&self, agent_id: &str) -> bool {
        self.breakers.can_attempt(agent_id).await
    }

    pub async fn reset_circuit(&self, agent_id: &str) {
        self.breakers.reset(agent_id).await;
    }

    pub async fn circuit_status(&self, agent_id: &str) -> CircuitBreakerStatus {
        self.breakers.status(agent_id).await
    }

    pub async fn all_circuit_statuses(&self) -> Vec<CircuitBreakerStatus> {
        self.breakers.all_statuses().await
    }

    // Health monitoring

    /// Store a sample; returns alerts it raised
    pub async fn ingest_metric_sample(&self, sample: HealthMetricSample) -> Vec<HealthAlert> {
        self.monitor.add_sample(sample).await
    }

    pub async fn get_health_status(&self, agent_id: &str) -> Option<AgentHealthStatus> {
        self.monitor.health_status(agent_id).await
    }

    pub async fn get_all_health_statuses(&self) -> Vec<AgentHealthStatus> {
        self.monitor.all_health_statuses().await
    }

    pub async fn resolve_alert(&self, alert_id: &str) -> bool {
        self.monitor.resolve_alert(alert_id).await
    }

    pub async fn overview(&self) -> HealthOverview {
        let statuses = self.monitor.all_health_statuses().await;
        let count = |level: HealthLevel| statuses.iter().filter(|s| s.level == level).count();
        let open_circuits = self
            .breakers
            .all_statuses()
            .await
            .iter()
            .filter(|s| s.state == CircuitState::Open)
            .count();

        HealthOverview {
            timestamp: Utc::now(),
            total_agents: statuses.len(),
            healthy: count(HealthLevel::Healthy),
            degraded: count(HealthLevel::Degraded),
            critical: count(HealthLevel::Critical),
            open_circuits,
            active_alerts: statuses.iter().map(|s| s.alerts.len()).sum(),
        }
    }

    // Recovery

    pub async fn evaluate_recovery(&self, agent_id: &str) -> Option<RecoveryExecution> {
        self.recovery.evaluate_recovery(agent_id).await
    }

    pub async fn get_execution(&self, execution_id: &str) -> Option<RecoveryExecution> {
        self.recovery.execution(execution_id).await
    }

    pub async fn get_executions_for_agent(&self, agent_id: &str) -> Vec<RecoveryExecution> {
        self.recovery.executions_for_agent(agent_id).await
    }

    pub async fn get_recent_executions(&self, limit: usize) -> Vec<RecoveryExecution> {
        self.recovery.recent_executions(limit).await
    }

    pub async fn cancel_execution(&self, execution_id: &str) -> bool {
        self.recovery.cancel_execution(execution_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> HealthService {
        HealthService::from_config(&AppConfig::default(), Infrastructure::simulated())
    }

    #[tokio::test]
    async fn test_outcomes_gate_attempts() {
        let service = service();
        for _ in 0..5 {
            service.record_agent_outcome("a", false, Some("timeout")).await;
        }
        assert!(!service.can_attempt("a").await);
        assert_eq!(
            service.circuit_status("a").await.last_error.as_deref(),
            Some("timeout")
        );

        service.reset_circuit("a").await;
        assert!(service.can_attempt("a").await);
    }

    #[tokio::test]
    async fn test_overview_counts() {
        let service = service();
        service
            .ingest_metric_sample(HealthMetricSample::new("a", 200.0, 0.01, 0.95, 1.0))
            .await;
        service
            .ingest_metric_sample(HealthMetricSample::new("b", 300.0, 0.9, 0.1, 20.0))
            .await;
        for _ in 0..5 {
            service.record_agent_outcome("b", false, None).await;
        }

        let overview = service.overview().await;
        assert_eq!(overview.total_agents, 2);
        assert_eq!(overview.healthy, 1);
        assert_eq!(overview.critical, 1);
        assert_eq!(overview.open_circuits, 1);
        assert!(overview.active_alerts >= 3);
    }

    #[tokio::test]
    async fn test_recovery_queries() {
        let service = service();
        service
            .ingest_metric_sample(HealthMetricSample::new("a", 200.0, 0.3, 0.95, 1.0))
            .await;

        let execution = service.evaluate_recovery("a").await.unwrap();
        assert_eq!(
            service.get_execution(&execution.id).await.unwrap().id,
            execution.id
        );
        assert_eq!(service.get_executions_for_agent("a").await.len(), 1);
        assert!(service.get_executions_for_agent("b").await.is_empty());
        assert_eq!(service.get_recent_executions(5).await.len(), 1);
        assert!(!service.cancel_execution(&execution.id).await);
    }
}
