//! Circuit Breaker Registry
//!
//! Keyed registry holding one [`CircuitBreaker`] per agent. Breakers are
//! created lazily on first reference. Each breaker sits behind its own async
//! mutex so that calls for the same agent serialize while different agents
//! proceed in parallel.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus, CircuitState,
};

/// Registry of per-agent circuit breakers
pub struct CircuitBreakerManager {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<Mutex<CircuitBreaker>>>,
}

impl CircuitBreakerManager {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Get or lazily create the breaker for an agent.
    ///
    /// The map guard is released before the caller locks the breaker.
    fn breaker(&self, agent_id: &str) -> Arc<Mutex<CircuitBreaker>> {
        if let Some(existing) = self.breakers.get(agent_id) {
            return existing.value().clone();
        }
        self.breakers
            .entry(agent_id.to_string())
            .or_insert_with(|| {
                debug!("Creating circuit breaker for agent {}", agent_id);
                Arc::new(Mutex::new(CircuitBreaker::new(
                    agent_id,
                    self.config.clone(),
                )))
            })
            .value()
            .clone()
    }

    /// Gate check before dispatching work to an agent
    pub async fn can_attempt(&self, agent_id: &str) -> bool {
        let breaker = self.breaker(agent_id);
        let mut guard = breaker.lock().await;
        guard.can_attempt_at(Utc::now())
    }

    pub async fn record_success(&self, agent_id: &str) {
        let breaker = self.breaker(agent_id);
        let mut guard = breaker.lock().await;
        guard.record_success_at(Utc::now());
    }

    pub async fn record_failure(&self, agent_id: &str, error: Option<&str>) {
        let breaker = self.breaker(agent_id);
        let mut guard = breaker.lock().await;
        guard.record_failure_at(Utc::now(), error);
    }

    /// Record a success or failure outcome reported by a probe
    pub async fn record_outcome(&self, agent_id: &str, success: bool, error: Option<&str>) {
        if success {
            self.record_success(agent_id).await;
        } else {
            self.record_failure(agent_id, error).await;
        }
    }

    /// Manual override back to Closed
    pub async fn reset(&self, agent_id: &str) {
        let breaker = self.breaker(agent_id);
        let mut guard = breaker.lock().await;
        guard.reset();
    }

    pub async fn state(&self, agent_id: &str) -> CircuitState {
        let breaker = self.breaker(agent_id);
        let guard = breaker.lock().await;
        guard.state()
    }

    /// Status for one agent, creating its breaker if needed
    pub async fn status(&self, agent_id: &str) -> CircuitBreakerStatus {
        let breaker = self.breaker(agent_id);
        let guard = breaker.lock().await;
        guard.status_at(Utc::now())
    }

    /// Status for every known agent, sorted by agent id
    pub async fn all_statuses(&self) -> Vec<CircuitBreakerStatus> {
        let breakers: Vec<Arc<Mutex<CircuitBreaker>>> = self
            .breakers
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let now = Utc::now();
        let mut statuses = Vec::with_capacity(breakers.len());
        for breaker in breakers {
            statuses.push(breaker.lock().await.status_at(now));
        }
        statuses.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        statuses
    }

    /// Agents whose circuit is currently open
    pub async fn open_circuits(&self) -> Vec<String> {
        self.all_statuses()
            .await
            .into_iter()
            .filter(|s| s.state == CircuitState::Open)
            .map(|s| s.agent_id)
            .collect()
    }

    /// Number of agents with a breaker
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: 3,
            success_threshold: 2,
            reset_timeout_ms: 20,
        }
    }

    #[tokio::test]
    async fn test_lazy_creation() {
        let manager = CircuitBreakerManager::with_defaults();
        assert!(manager.is_empty());

        assert!(manager.can_attempt("agent-1").await);
        assert_eq!(manager.len(), 1);

        let status = manager.status("agent-2").await;
        assert_eq!(status.state, CircuitState::Closed);
        assert_eq!(manager.len(), 2);
    }

    #[tokio::test]
    async fn test_agents_are_independent() {
        let manager = CircuitBreakerManager::new(fast_config());
        for _ in 0..3 {
            manager.record_failure("bad", Some("refused")).await;
        }
        manager.record_success("good").await;

        assert_eq!(manager.state("bad").await, CircuitState::Open);
        assert_eq!(manager.state("good").await, CircuitState::Closed);
        assert_eq!(manager.open_circuits().await, vec!["bad".to_string()]);
    }

    #[tokio::test]
    async fn test_full_cycle_through_half_open() {
        let manager = CircuitBreakerManager::new(fast_config());
        for _ in 0..3 {
            manager.record_outcome("a1", false, None).await;
        }
        assert!(!manager.can_attempt("a1").await);

        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        assert!(manager.can_attempt("a1").await);
        assert_eq!(manager.state("a1").await, CircuitState::HalfOpen);

        manager.record_outcome("a1", true, None).await;
        manager.record_outcome("a1", true, None).await;
        assert_eq!(manager.state("a1").await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_concurrent_failures_for_same_agent_are_counted() {
        let manager = Arc::new(CircuitBreakerManager::new(CircuitBreakerConfig {
            failure_threshold: 1000,
            ..Default::default()
        }));

        let mut handles = Vec::new();
        for _ in 0..50 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                manager.record_failure("shared", None).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let status = manager.status("shared").await;
        assert_eq!(status.failure_count, 50);
        assert_eq!(status.total_failures, 50);
    }

    #[tokio::test]
    async fn test_reset_closes_open_circuit() {
        let manager = CircuitBreakerManager::new(fast_config());
        for _ in 0..3 {
            manager.record_failure("a1", None).await;
        }
        manager.reset("a1").await;

        assert_eq!(manager.state("a1").await, CircuitState::Closed);
        assert!(manager.can_attempt("a1").await);
        assert_eq!(manager.status("a1").await.total_failures, 3);
    }

    #[tokio::test]
    async fn test_all_statuses_sorted() {
        let manager = CircuitBreakerManager::with_defaults();
        manager.record_success("b").await;
        manager.record_success("a").await;

        let ids: Vec<String> = manager
            .all_statuses()
            .await
            .into_iter()
            .map(|s| s.agent_id)
            .collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}
