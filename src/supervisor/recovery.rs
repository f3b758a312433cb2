//! Recovery System
//!
//! Selects a strategy for an unhealthy agent, enforces per-strategy
//! cooldowns, and runs the strategy's actions while recording progress in an
//! in-memory execution ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::actions::{
    ActionSeverity, Infrastructure, Prerequisite, RecoveryAction, RecoveryResult,
};
use super::health_monitor::{AgentHealthStatus, HealthLevel, HealthMonitor};
use super::playbook::{RecoveryContext, RecoveryPlaybook, RecoveryStrategy, SystemSnapshot};
use crate::coordination::CircuitBreakerManager;

/// Upper bound accepted for [`RecoveryConfig::action_timeout_factor`]
pub const MAX_ACTION_TIMEOUT_FACTOR: f64 = 100.0;

/// Configuration for the recovery system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Executions kept in the ledger
    #[serde(default = "default_max_executions")]
    pub max_executions: usize,
    /// Multiplier applied to an action's estimated duration to get its timeout
    #[serde(default = "default_action_timeout_factor")]
    pub action_timeout_factor: f64,
    /// Run action loops on spawned tasks instead of inline
    #[serde(default)]
    pub run_in_background: bool,
}

fn default_max_executions() -> usize {
    1000
}

fn default_action_timeout_factor() -> f64 {
    2.0
}

impl RecoveryConfig {
    /// Timeout for an action, falling back to its estimate when the factor
    /// does not yield a representable duration
    pub fn action_timeout(&self, estimated: std::time::Duration) -> std::time::Duration {
        std::time::Duration::try_from_secs_f64(estimated.as_secs_f64() * self.action_timeout_factor)
            .unwrap_or(estimated)
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_executions: default_max_executions(),
            action_timeout_factor: default_action_timeout_factor(),
            run_in_background: false,
        }
    }
}

/// Lifecycle of an execution; everything but `Running` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Running => write!(f, "running"),
            ExecutionStatus::Completed => write!(f, "completed"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One run of a recovery strategy against an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryExecution {
    pub id: String,
    pub agent_id: String,
    pub strategy_id: String,
    pub trigger_alert_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    /// 0-100
    pub progress: u8,
    pub current_action: Option<String>,
    pub results: Vec<RecoveryResult>,
    pub error: Option<String>,
}

impl RecoveryExecution {
    fn start(agent_id: &str, strategy_id: &str, trigger_alert_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            strategy_id: strategy_id.to_string(),
            trigger_alert_id: trigger_alert_id.to_string(),
            started_at: now,
            ended_at: None,
            status: ExecutionStatus::Running,
            progress: 0,
            current_action: None,
            results: Vec::new(),
            error: None,
        }
    }

    /// Move to a terminal state unless already there
    fn finish(&mut self, status: ExecutionStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.ended_at = Some(Utc::now());
        self.current_action = None;
        self.error = error;
        if status == ExecutionStatus::Completed {
            self.progress = 100;
        }
        true
    }
}

/// Progress notifications published by the recovery system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecoveryEvent {
    Started {
        execution_id: String,
        agent_id: String,
        strategy_id: String,
    },
    ActionCompleted {
        execution_id: String,
        result: RecoveryResult,
    },
    Finished {
        execution_id: String,
        status: ExecutionStatus,
    },
}

type ExecutionHandle = Arc<RwLock<RecoveryExecution>>;

/// Execution records plus the cooldown map, guarded together
#[derive(Default)]
struct Ledger {
    executions: HashMap<String, ExecutionHandle>,
    /// Execution ids in start order
    order: VecDeque<String>,
    cooldowns: HashMap<(String, String), DateTime<Utc>>,
}

impl Ledger {
    fn in_cooldown(&self, agent_id: &str, strategy: &RecoveryStrategy, now: DateTime<Utc>) -> bool {
        self.cooldowns
            .get(&(agent_id.to_string(), strategy.id.to_string()))
            .map(|last| now - *last < strategy.cooldown)
            .unwrap_or(false)
    }

    fn insert(&mut self, execution: RecoveryExecution, capacity: usize) -> ExecutionHandle {
        let id = execution.id.clone();
        let handle = Arc::new(RwLock::new(execution));
        self.executions.insert(id.clone(), handle.clone());
        self.order.push_back(id);
        self.evict(capacity);
        handle
    }

    /// Drop the oldest terminal executions until within capacity.
    /// Running executions are never evicted.
    fn evict(&mut self, capacity: usize) {
        while self.order.len() > capacity {
            let victim = self.order.iter().position(|id| {
                self.executions
                    .get(id)
                    .and_then(|h| h.try_read().ok().map(|e| e.status.is_terminal()))
                    .unwrap_or(false)
            });
            let Some(index) = victim else {
                break;
            };
            if let Some(id) = self.order.remove(index) {
                self.executions.remove(&id);
            }
        }
    }

    fn handles_newest_first(&self) -> Vec<ExecutionHandle> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.executions.get(id).cloned())
            .collect()
    }
}

/// State shared between the system and spawned action loops
#[derive(Clone)]
struct Executor {
    breakers: Arc<CircuitBreakerManager>,
    infra: Infrastructure,
    config: RecoveryConfig,
    event_tx: broadcast::Sender<RecoveryEvent>,
}

impl Executor {
    fn emit(&self, event: RecoveryEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Run a single action, converting unmet prerequisites and timeouts into
    /// failed results. Only collaborator errors are returned as `Err`.
    async fn perform(
        &self,
        action: &RecoveryAction,
        context: &RecoveryContext,
    ) -> crate::error::Result<RecoveryResult> {
        if let Some(missing) = action.unmet_prerequisite(&context.system) {
            warn!(
                "Skipping {} for {}: prerequisite not met ({})",
                action.id,
                context.agent_id,
                missing.description()
            );
            return Ok(RecoveryResult::failed(
                action,
                format!("Prerequisite not met: {}", missing.description()),
            ));
        }

        let limit = self.config.action_timeout(action.estimated_duration);
        match tokio::time::timeout(limit, action.execute(context, &self.infra, &self.breakers)).await
        {
            Ok(Ok(outcome)) => {
                if !outcome.success {
                    warn!(
                        "Action {} for {} reported failure: {}",
                        action.id, context.agent_id, outcome.message
                    );
                }
                Ok(RecoveryResult::from_outcome(action, outcome))
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                warn!(
                    "Action {} for {} timed out after {:?}",
                    action.id, context.agent_id, limit
                );
                Ok(RecoveryResult::failed(
                    action,
                    format!("Timed out after {}ms", limit.as_millis()),
                ))
            }
        }
    }

    async fn finish(&self, handle: &ExecutionHandle, status: ExecutionStatus, error: Option<String>) {
        let (id, changed) = {
            let mut execution = handle.write().await;
            let changed = execution.finish(status, error);
            (execution.id.clone(), changed)
        };
        if changed {
            match status {
                ExecutionStatus::Completed => info!("Recovery {} completed", id),
                _ => warn!("Recovery {} finished as {}", id, status),
            }
            self.emit(RecoveryEvent::Finished {
                execution_id: id,
                status,
            });
        }
    }

    /// Drive every action of a strategy in order
    async fn run(self, handle: ExecutionHandle, actions: Vec<RecoveryAction>, context: RecoveryContext) {
        let total = actions.len();
        for (index, action) in actions.iter().enumerate() {
            let execution_id = {
                let mut execution = handle.write().await;
                if execution.status.is_terminal() {
                    debug!("Recovery {} stopped before {}", execution.id, action.id);
                    return;
                }
                execution.progress = ((index as f64 / total as f64) * 100.0).round() as u8;
                execution.current_action = Some(action.description.to_string());
                execution.id.clone()
            };

            match self.perform(action, &context).await {
                Ok(result) => {
                    let abort = !result.success && action.severity == ActionSeverity::Critical;
                    let message = result.message.clone();
                    handle.write().await.results.push(result.clone());
                    self.emit(RecoveryEvent::ActionCompleted {
                        execution_id,
                        result,
                    });
                    if abort {
                        error!(
                            "Critical action {} failed for {}: {}",
                            action.id, context.agent_id, message
                        );
                        self.finish(
                            &handle,
                            ExecutionStatus::Failed,
                            Some(format!("Critical action {} failed: {}", action.id, message)),
                        )
                        .await;
                        return;
                    }
                }
                Err(e) => {
                    error!("Action {} for {} errored: {}", action.id, context.agent_id, e);
                    self.finish(&handle, ExecutionStatus::Failed, Some(e.to_string()))
                        .await;
                    return;
                }
            }
        }
        self.finish(&handle, ExecutionStatus::Completed, None).await;
    }
}

/// Strategy selection, cooldowns and the execution ledger
pub struct RecoverySystem {
    monitor: Arc<HealthMonitor>,
    playbook: RecoveryPlaybook,
    config: RecoveryConfig,
    executor: Executor,
    ledger: Mutex<Ledger>,
}

impl RecoverySystem {
    pub fn new(
        breakers: Arc<CircuitBreakerManager>,
        monitor: Arc<HealthMonitor>,
        infra: Infrastructure,
        config: RecoveryConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            monitor,
            playbook: RecoveryPlaybook::default(),
            executor: Executor {
                breakers,
                infra,
                config: config.clone(),
                event_tx,
            },
            config,
            ledger: Mutex::new(Ledger::default()),
        }
    }

    /// Replace the strategy catalogue
    pub fn with_playbook(mut self, playbook: RecoveryPlaybook) -> Self {
        self.playbook = playbook;
        self
    }

    pub fn playbook(&self) -> &RecoveryPlaybook {
        &self.playbook
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecoveryEvent> {
        self.executor.event_tx.subscribe()
    }

    /// Evaluate and, when a strategy applies and is not cooling down, run it.
    ///
    /// Returns the execution record, or `None` when no action was taken.
    pub async fn evaluate_recovery(&self, agent_id: &str) -> Option<RecoveryExecution> {
        self.evaluate(agent_id, self.config.run_in_background).await
    }

    /// Like [`Self::evaluate_recovery`] but always runs the actions on a
    /// spawned task, returning the freshly started record.
    pub async fn evaluate_recovery_detached(&self, agent_id: &str) -> Option<RecoveryExecution> {
        self.evaluate(agent_id, true).await
    }

    async fn evaluate(&self, agent_id: &str, detached: bool) -> Option<RecoveryExecution> {
        let health = self.monitor.health_status(agent_id).await?;
        let mut context = self.build_context(health).await;
        let strategy = self.playbook.select(&context)?;
        context.system = self.system_snapshot(agent_id, &strategy.actions).await;

        let handle = {
            let mut ledger = self.ledger.lock().await;
            let now = Utc::now();
            if ledger.in_cooldown(agent_id, strategy, now) {
                debug!("Strategy {} for {} is cooling down", strategy.id, agent_id);
                return None;
            }
            ledger
                .cooldowns
                .insert((agent_id.to_string(), strategy.id.to_string()), now);
            let execution =
                RecoveryExecution::start(agent_id, strategy.id, &context.trigger.id, now);
            ledger.insert(execution, self.config.max_executions)
        };

        let snapshot = handle.read().await.clone();
        info!(
            "Starting recovery {} ({}) for agent {}, trigger: {}",
            snapshot.id, strategy.name, agent_id, context.trigger.message
        );
        self.executor.emit(RecoveryEvent::Started {
            execution_id: snapshot.id.clone(),
            agent_id: agent_id.to_string(),
            strategy_id: strategy.id.to_string(),
        });

        let run = self
            .executor
            .clone()
            .run(handle.clone(), strategy.actions.clone(), context);
        if detached {
            tokio::spawn(run);
            return Some(snapshot);
        }
        run.await;
        let finished = handle.read().await.clone();
        Some(finished)
    }

    /// Context for strategy selection. Predicates only read the agent's own
    /// health and circuit, so the fleet snapshot starts empty.
    async fn build_context(&self, health: AgentHealthStatus) -> RecoveryContext {
        let agent_id = health.agent_id.clone();
        let circuit = self.executor.breakers.status(&agent_id).await;
        let trigger = RecoveryContext::select_trigger(&agent_id, &health.alerts);
        RecoveryContext {
            agent_id,
            health,
            circuit,
            trigger,
            system: SystemSnapshot::default(),
        }
    }

    /// Fleet view for the selected strategy's prerequisites and targets.
    /// Capacity is queried only when an action needs it.
    async fn system_snapshot(&self, agent_id: &str, actions: &[RecoveryAction]) -> SystemSnapshot {
        let mut fleet = self.monitor.fleet_summary().await;
        fleet.sort_by(|a, b| b.health_score.total_cmp(&a.health_score));
        let healthy_agents = fleet
            .iter()
            .filter(|s| s.level == HealthLevel::Healthy)
            .count();
        let healthy_peers = fleet
            .iter()
            .filter(|s| s.level == HealthLevel::Healthy && s.agent_id != agent_id)
            .map(|s| s.agent_id.clone())
            .collect();

        let needs_capacity = actions
            .iter()
            .any(|a| a.prerequisites.contains(&Prerequisite::SpareCapacity));
        let available_capacity = if needs_capacity {
            match self.executor.infra.capacity.available_capacity().await {
                Ok(units) => units,
                Err(e) => {
                    warn!("Capacity query failed, assuming none: {}", e);
                    0
                }
            }
        } else {
            0
        };

        SystemSnapshot {
            total_agents: fleet.len(),
            healthy_agents,
            healthy_peers,
            total_queue_depth: fleet.iter().map(|s| s.queue_depth).sum(),
            available_capacity,
        }
    }

    /// Look up an execution by id
    pub async fn execution(&self, execution_id: &str) -> Option<RecoveryExecution> {
        let handle = self.ledger.lock().await.executions.get(execution_id).cloned()?;
        let execution = handle.read().await.clone();
        Some(execution)
    }

    /// Executions for one agent, most recent first
    pub async fn executions_for_agent(&self, agent_id: &str) -> Vec<RecoveryExecution> {
        let handles = self.ledger.lock().await.handles_newest_first();
        let mut executions = Vec::new();
        for handle in handles {
            let execution = handle.read().await;
            if execution.agent_id == agent_id {
                executions.push(execution.clone());
            }
        }
        executions
    }

    /// Most recent executions across all agents
    pub async fn recent_executions(&self, limit: usize) -> Vec<RecoveryExecution> {
        let handles = self.ledger.lock().await.handles_newest_first();
        let mut executions = Vec::with_capacity(limit.min(handles.len()));
        for handle in handles.into_iter().take(limit) {
            executions.push(handle.read().await.clone());
        }
        executions
    }

    /// Cancel a running execution. The action in flight completes, but no
    /// further actions start and the status stays `Cancelled`.
    pub async fn cancel_execution(&self, execution_id: &str) -> bool {
        let Some(handle) = self.ledger.lock().await.executions.get(execution_id).cloned() else {
            return false;
        };
        let cancelled = handle.write().await.finish(ExecutionStatus::Cancelled, None);
        if cancelled {
            info!("Recovery {} cancelled", execution_id);
            self.executor.emit(RecoveryEvent::Finished {
                execution_id: execution_id.to_string(),
                status: ExecutionStatus::Cancelled,
            });
        }
        cancelled
    }

    /// Executions currently held in the ledger
    pub async fn ledger_len(&self) -> usize {
        self.ledger.lock().await.order.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VigilError;
    use crate::supervisor::actions::{
        ActionOutcome, MockCapacityProvider, MockProcessManager, MockTaskScheduler,
        ProcessManager, SimulatedInfrastructure,
    };
    use crate::supervisor::metrics::HealthMetricSample;
    use async_trait::async_trait;
    use std::time::Duration as StdDuration;

    struct Harness {
        breakers: Arc<CircuitBreakerManager>,
        monitor: Arc<HealthMonitor>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                breakers: Arc::new(CircuitBreakerManager::with_defaults()),
                monitor: Arc::new(HealthMonitor::with_defaults()),
            }
        }

        fn system(&self, infra: Infrastructure, config: RecoveryConfig) -> RecoverySystem {
            RecoverySystem::new(self.breakers.clone(), self.monitor.clone(), infra, config)
        }

        fn simulated(&self) -> RecoverySystem {
            self.system(Infrastructure::simulated(), RecoveryConfig::default())
        }

        async fn ingest(&self, agent: &str, err: f64, completion: f64, queue: f64) {
            self.monitor
                .add_sample(HealthMetricSample::new(agent, 300.0, err, completion, queue))
                .await;
        }

        async fn trip(&self, agent: &str) {
            for _ in 0..5 {
                self.breakers.record_failure(agent, Some("down")).await;
            }
        }
    }

    fn capacity(units: u32) -> MockCapacityProvider {
        let mut capacity = MockCapacityProvider::new();
        capacity
            .expect_available_capacity()
            .returning(move || Ok(units));
        capacity
    }

    #[tokio::test]
    async fn test_unknown_agent_gets_no_recovery() {
        let h = Harness::new();
        let system = h.simulated();
        assert!(system.evaluate_recovery("ghost").await.is_none());
        assert_eq!(system.ledger_len().await, 0);
    }

    #[tokio::test]
    async fn test_healthy_agent_gets_no_recovery() {
        let h = Harness::new();
        h.ingest("a", 0.01, 0.95, 1.0).await;
        assert!(h.simulated().evaluate_recovery("a").await.is_none());
    }

    #[tokio::test]
    async fn test_open_circuit_is_reset() {
        let h = Harness::new();
        h.ingest("a", 0.01, 0.95, 1.0).await;
        h.trip("a").await;
        let system = h.simulated();

        let execution = system.evaluate_recovery("a").await.unwrap();
        assert_eq!(execution.strategy_id, "circuit_breaker_recovery");
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.progress, 100);
        assert!(execution.ended_at.is_some());
        assert!(h.breakers.can_attempt("a").await);
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_same_strategy_only() {
        let h = Harness::new();
        h.ingest("a", 0.01, 0.95, 1.0).await;
        h.trip("a").await;
        let system = h.simulated();

        assert!(system.evaluate_recovery("a").await.is_some());

        h.trip("a").await;
        assert!(system.evaluate_recovery("a").await.is_none());

        // A different strategy is still eligible
        h.ingest("a", 0.3, 0.95, 1.0).await;
        let execution = system.evaluate_recovery("a").await.unwrap();
        assert_eq!(execution.strategy_id, "high_error_rate");
        assert_eq!(system.executions_for_agent("a").await.len(), 2);
    }

    #[tokio::test]
    async fn test_progress_and_results_recorded_in_order() {
        let h = Harness::new();
        h.ingest("a", 0.3, 0.95, 1.0).await;
        let system = h.simulated();

        let execution = system.evaluate_recovery("a").await.unwrap();
        assert_eq!(execution.strategy_id, "high_error_rate");
        let ids: Vec<&str> = execution.results.iter().map(|r| r.action_id.as_str()).collect();
        assert_eq!(ids, vec!["request_throttle", "circuit_reset", "agent_restart"]);
        assert!(execution.results.iter().all(|r| r.success));
        assert_eq!(execution.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_non_critical_failures_still_complete() {
        let h = Harness::new();
        h.ingest("a", 0.3, 0.95, 1.0).await;

        let mut scheduler = MockTaskScheduler::new();
        scheduler
            .expect_throttle_agent()
            .returning(|_, _| Ok(ActionOutcome::failure("throttle rejected")));
        let mut processes = MockProcessManager::new();
        processes
            .expect_restart_agent()
            .returning(|_| Ok(ActionOutcome::failure("restart refused")));

        let system = h.system(
            Infrastructure::new(Arc::new(processes), Arc::new(scheduler), Arc::new(capacity(0))),
            RecoveryConfig::default(),
        );
        let execution = system.evaluate_recovery("a").await.unwrap();

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.results.len(), 3);
        assert!(!execution.results[0].success);
        assert!(execution.results[1].success);
        assert!(!execution.results[2].success);
        assert!(execution.error.is_none());
    }

    #[tokio::test]
    async fn test_failed_failover_fails_critical_strategy() {
        let h = Harness::new();
        // Lone failing agent: no healthy peer for redistribution or failover
        h.ingest("a", 0.9, 0.1, 20.0).await;

        let mut processes = MockProcessManager::new();
        processes
            .expect_restart_agent()
            .times(1)
            .returning(|_| Ok(ActionOutcome::success("restarted")));
        processes.expect_failover_agent().never();

        let system = h.system(
            Infrastructure::new(
                Arc::new(processes),
                Arc::new(MockTaskScheduler::new()),
                Arc::new(capacity(0)),
            ),
            RecoveryConfig::default(),
        );
        let execution = system.evaluate_recovery("a").await.unwrap();

        assert_eq!(execution.strategy_id, "critical_failure");
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.results.len(), 3);
        assert!(!execution.results[0].success);
        assert!(execution.results[1].success);
        assert!(!execution.results[2].success);
        assert!(execution.error.unwrap().contains("failover"));
        assert!(execution.progress < 100);
    }

    #[tokio::test]
    async fn test_critical_failure_with_healthy_peer_completes() {
        let h = Harness::new();
        h.ingest("b", 0.01, 0.95, 1.0).await;
        h.ingest("a", 0.9, 0.1, 20.0).await;

        let execution = h.simulated().evaluate_recovery("a").await.unwrap();
        assert_eq!(execution.strategy_id, "critical_failure");
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert!(execution.results.iter().all(|r| r.success));
    }

    #[tokio::test]
    async fn test_collaborator_error_fails_execution() {
        let h = Harness::new();
        h.ingest("a", 0.3, 0.95, 1.0).await;

        let mut scheduler = MockTaskScheduler::new();
        scheduler
            .expect_throttle_agent()
            .returning(|_, _| Err(VigilError::infrastructure("scheduler", "connection refused")));

        let system = h.system(
            Infrastructure::new(
                Arc::new(MockProcessManager::new()),
                Arc::new(scheduler),
                Arc::new(capacity(0)),
            ),
            RecoveryConfig::default(),
        );
        let execution = system.evaluate_recovery("a").await.unwrap();

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.results.is_empty());
        assert!(execution.error.unwrap().contains("connection refused"));
    }

    struct SlowProcesses;

    #[async_trait]
    impl ProcessManager for SlowProcesses {
        async fn restart_agent(&self, _agent_id: &str) -> crate::error::Result<ActionOutcome> {
            tokio::time::sleep(StdDuration::from_secs(5)).await;
            Ok(ActionOutcome::success("restarted"))
        }

        async fn failover_agent(
            &self,
            _agent_id: &str,
            _target_id: &str,
        ) -> crate::error::Result<ActionOutcome> {
            Ok(ActionOutcome::success("failed over"))
        }
    }

    fn slow_infra() -> Infrastructure {
        let sim = Arc::new(SimulatedInfrastructure::default());
        Infrastructure::new(Arc::new(SlowProcesses), sim.clone(), sim)
    }

    #[tokio::test]
    async fn test_action_timeout_records_failure() {
        let h = Harness::new();
        h.ingest("a", 0.3, 0.95, 1.0).await;
        let system = h.system(
            slow_infra(),
            RecoveryConfig {
                // 60s restart estimate -> 60ms timeout
                action_timeout_factor: 0.001,
                ..Default::default()
            },
        );

        let execution = system.evaluate_recovery("a").await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        let restart = execution.results.last().unwrap();
        assert_eq!(restart.action_id, "agent_restart");
        assert!(!restart.success);
        assert!(restart.message.contains("Timed out"));
    }

    #[tokio::test]
    async fn test_oversized_timeout_factor_falls_back_to_estimate() {
        for factor in [1e300, f64::INFINITY, -2.0] {
            let h = Harness::new();
            h.ingest("a", 0.3, 0.95, 1.0).await;
            let config = RecoveryConfig {
                action_timeout_factor: factor,
                ..Default::default()
            };
            assert_eq!(
                config.action_timeout(StdDuration::from_secs(60)),
                StdDuration::from_secs(60)
            );

            let system = h.system(Infrastructure::simulated(), config);
            let execution = system.evaluate_recovery("a").await.unwrap();
            assert_eq!(execution.status, ExecutionStatus::Completed);
            assert!(execution.results.iter().all(|r| r.success));
        }
    }

    #[test]
    fn test_action_timeout_scales_estimate() {
        let config = RecoveryConfig::default();
        assert_eq!(
            config.action_timeout(StdDuration::from_secs(45)),
            StdDuration::from_secs(90)
        );
    }

    fn always(_: &RecoveryContext) -> bool {
        true
    }

    #[tokio::test]
    async fn test_critical_failure_skips_remaining_actions() {
        let h = Harness::new();
        // Only agent in the fleet, so failover has no target
        h.ingest("a", 0.3, 0.95, 1.0).await;

        let mut processes = MockProcessManager::new();
        processes.expect_restart_agent().never();
        processes.expect_failover_agent().never();

        let playbook = RecoveryPlaybook::new(vec![RecoveryStrategy::new(
            "escalating",
            "Escalating Recovery",
            "Reset, fail over, then restart",
            chrono::Duration::seconds(60),
            vec![
                RecoveryAction::circuit_reset(),
                RecoveryAction::failover(),
                RecoveryAction::agent_restart(),
            ],
            always,
        )]);
        let system = h
            .system(
                Infrastructure::new(
                    Arc::new(processes),
                    Arc::new(MockTaskScheduler::new()),
                    Arc::new(MockCapacityProvider::new()),
                ),
                RecoveryConfig::default(),
            )
            .with_playbook(playbook);

        let execution = system.evaluate_recovery("a").await.unwrap();
        assert_eq!(execution.strategy_id, "escalating");
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.results.len(), 2);
        assert!(execution.results[0].success);
        assert_eq!(execution.results[1].action_id, "failover");
        assert!(!execution.results[1].success);
        assert!(execution.progress < 100);
        assert!(execution.error.unwrap().contains("failover"));
    }

    #[tokio::test]
    async fn test_capacity_queried_only_for_scaling_strategies() {
        let h = Harness::new();
        h.ingest("healthy", 0.01, 0.95, 1.0).await;
        h.ingest("erroring", 0.3, 0.95, 1.0).await;

        let mut capacity = MockCapacityProvider::new();
        capacity.expect_available_capacity().never();
        let sim = Arc::new(SimulatedInfrastructure::default());
        let system = h.system(
            Infrastructure::new(sim.clone(), sim, Arc::new(capacity)),
            RecoveryConfig::default(),
        );

        assert!(system.evaluate_recovery("healthy").await.is_none());
        let execution = system.evaluate_recovery("erroring").await.unwrap();
        assert_eq!(execution.strategy_id, "high_error_rate");
        assert_eq!(execution.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_detached_execution_can_be_cancelled() {
        let h = Harness::new();
        h.ingest("a", 0.3, 0.95, 1.0).await;
        let system = h.system(slow_infra(), RecoveryConfig::default());

        let started = system.evaluate_recovery_detached("a").await.unwrap();
        assert_eq!(started.status, ExecutionStatus::Running);
        assert_eq!(started.progress, 0);

        assert!(system.cancel_execution(&started.id).await);
        assert!(!system.cancel_execution(&started.id).await);

        tokio::time::sleep(StdDuration::from_millis(50)).await;
        let execution = system.execution(&started.id).await.unwrap();
        assert_eq!(execution.status, ExecutionStatus::Cancelled);
        assert!(execution.ended_at.is_some());
        assert!(execution.results.len() < 3);
    }

    #[tokio::test]
    async fn test_cancel_unknown_or_finished() {
        let h = Harness::new();
        h.ingest("a", 0.3, 0.95, 1.0).await;
        let system = h.simulated();

        assert!(!system.cancel_execution("missing").await);
        let execution = system.evaluate_recovery("a").await.unwrap();
        assert!(!system.cancel_execution(&execution.id).await);
        assert_eq!(
            system.execution(&execution.id).await.unwrap().status,
            ExecutionStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_events_published() {
        let h = Harness::new();
        h.ingest("a", 0.01, 0.95, 1.0).await;
        h.trip("a").await;
        let system = h.simulated();
        let mut rx = system.subscribe();

        system.evaluate_recovery("a").await.unwrap();

        assert!(matches!(rx.recv().await.unwrap(), RecoveryEvent::Started { .. }));
        assert!(matches!(rx.recv().await.unwrap(), RecoveryEvent::ActionCompleted { .. }));
        match rx.recv().await.unwrap() {
            RecoveryEvent::Finished { status, .. } => assert_eq!(status, ExecutionStatus::Completed),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ledger_bounded_and_ordered() {
        let h = Harness::new();
        for agent in ["a", "b", "c"] {
            h.ingest(agent, 0.01, 0.95, 1.0).await;
            h.trip(agent).await;
        }
        let system = h.system(
            Infrastructure::simulated(),
            RecoveryConfig {
                max_executions: 2,
                ..Default::default()
            },
        );

        for agent in ["a", "b", "c"] {
            system.evaluate_recovery(agent).await.unwrap();
        }

        assert_eq!(system.ledger_len().await, 2);
        let recent: Vec<String> = system
            .recent_executions(10)
            .await
            .into_iter()
            .map(|e| e.agent_id)
            .collect();
        assert_eq!(recent, vec!["c".to_string(), "b".to_string()]);
        assert_eq!(system.recent_executions(1).await.len(), 1);
    }
}
