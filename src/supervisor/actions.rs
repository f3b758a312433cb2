//! Recovery actions and the infrastructure they drive
//!
//! Actions are static descriptors. Executing one dispatches to an injected
//! collaborator (process manager, task scheduler, capacity provider) or, for
//! circuit resets, to the breaker registry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::playbook::{RecoveryContext, SystemSnapshot};
use crate::coordination::CircuitBreakerManager;
use crate::error::Result;

/// Throttle factor applied by the request-throttle action
pub const THROTTLE_FACTOR: f64 = 0.5;
/// Capacity units requested by the resource-scale action
pub const SCALE_UNITS: u32 = 1;

/// What an action does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Restart,
    Scale,
    Failover,
    Throttle,
    CircuitReset,
    TaskRedistribute,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Restart => write!(f, "restart"),
            ActionKind::Scale => write!(f, "scale"),
            ActionKind::Failover => write!(f, "failover"),
            ActionKind::Throttle => write!(f, "throttle"),
            ActionKind::CircuitReset => write!(f, "circuit_reset"),
            ActionKind::TaskRedistribute => write!(f, "task_redistribute"),
        }
    }
}

/// Blast radius of an action; a failed `Critical` action aborts its execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for ActionSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionSeverity::Low => write!(f, "low"),
            ActionSeverity::Medium => write!(f, "medium"),
            ActionSeverity::High => write!(f, "high"),
            ActionSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Conditions checked against the fleet before an action runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prerequisite {
    /// At least one healthy agent other than the target
    HealthyPeerAvailable,
    /// The capacity provider reports spare capacity
    SpareCapacity,
}

impl Prerequisite {
    pub fn is_met(&self, system: &SystemSnapshot) -> bool {
        match self {
            Prerequisite::HealthyPeerAvailable => !system.healthy_peers.is_empty(),
            Prerequisite::SpareCapacity => system.available_capacity > 0,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Prerequisite::HealthyPeerAvailable => "healthy peer available",
            Prerequisite::SpareCapacity => "spare capacity available",
        }
    }
}

/// What a collaborator reports back after acting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<HashMap<String, f64>>,
}

impl ActionOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            metrics: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            metrics: None,
        }
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), value);
        self
    }
}

/// Recorded result of one action within an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub action_id: String,
    pub success: bool,
    pub message: String,
    /// Suggested delay before re-checking the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_check_in_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<HashMap<String, f64>>,
    pub completed_at: DateTime<Utc>,
}

impl RecoveryResult {
    pub fn from_outcome(action: &RecoveryAction, outcome: ActionOutcome) -> Self {
        Self {
            action_id: action.id.to_string(),
            success: outcome.success,
            message: outcome.message,
            next_check_in_secs: outcome.success.then(|| action.next_check_in()).flatten(),
            metrics: outcome.metrics,
            completed_at: Utc::now(),
        }
    }

    pub fn failed(action: &RecoveryAction, message: impl Into<String>) -> Self {
        Self {
            action_id: action.id.to_string(),
            success: false,
            message: message.into(),
            next_check_in_secs: None,
            metrics: None,
            completed_at: Utc::now(),
        }
    }
}

/// Restarts and fails over agent processes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessManager: Send + Sync {
    async fn restart_agent(&self, agent_id: &str) -> Result<ActionOutcome>;
    async fn failover_agent(&self, agent_id: &str, target_id: &str) -> Result<ActionOutcome>;
}

/// Moves and rate-limits work
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    async fn redistribute_tasks(&self, agent_id: &str, peers: &[String]) -> Result<ActionOutcome>;
    async fn throttle_agent(&self, agent_id: &str, factor: f64) -> Result<ActionOutcome>;
}

/// Reports and provisions spare capacity
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CapacityProvider: Send + Sync {
    async fn available_capacity(&self) -> Result<u32>;
    async fn scale_up(&self, agent_id: &str, units: u32) -> Result<ActionOutcome>;
}

/// Bundle of collaborators handed to the recovery system
#[derive(Clone)]
pub struct Infrastructure {
    pub processes: Arc<dyn ProcessManager>,
    pub scheduler: Arc<dyn TaskScheduler>,
    pub capacity: Arc<dyn CapacityProvider>,
}

impl Infrastructure {
    pub fn new(
        processes: Arc<dyn ProcessManager>,
        scheduler: Arc<dyn TaskScheduler>,
        capacity: Arc<dyn CapacityProvider>,
    ) -> Self {
        Self {
            processes,
            scheduler,
            capacity,
        }
    }

    /// All three roles served by one [`SimulatedInfrastructure`]
    pub fn simulated() -> Self {
        Self::from_simulation(Arc::new(SimulatedInfrastructure::default()))
    }

    pub fn from_simulation(sim: Arc<SimulatedInfrastructure>) -> Self {
        Self {
            processes: sim.clone(),
            scheduler: sim.clone(),
            capacity: sim,
        }
    }
}

/// A single step of a recovery strategy
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryAction {
    pub id: &'static str,
    pub kind: ActionKind,
    pub severity: ActionSeverity,
    pub description: &'static str,
    pub estimated_duration: Duration,
    pub prerequisites: Vec<Prerequisite>,
}

impl RecoveryAction {
    pub fn circuit_reset() -> Self {
        Self {
            id: "circuit_reset",
            kind: ActionKind::CircuitReset,
            severity: ActionSeverity::Low,
            description: "Reset circuit breaker to closed",
            estimated_duration: Duration::from_secs(5),
            prerequisites: Vec::new(),
        }
    }

    pub fn request_throttle() -> Self {
        Self {
            id: "request_throttle",
            kind: ActionKind::Throttle,
            severity: ActionSeverity::Medium,
            description: "Throttle incoming requests",
            estimated_duration: Duration::from_secs(10),
            prerequisites: Vec::new(),
        }
    }

    pub fn task_redistribute() -> Self {
        Self {
            id: "task_redistribute",
            kind: ActionKind::TaskRedistribute,
            severity: ActionSeverity::Medium,
            description: "Redistribute queued tasks to healthy peers",
            estimated_duration: Duration::from_secs(30),
            prerequisites: vec![Prerequisite::HealthyPeerAvailable],
        }
    }

    pub fn agent_restart() -> Self {
        Self {
            id: "agent_restart",
            kind: ActionKind::Restart,
            severity: ActionSeverity::High,
            description: "Restart agent process",
            estimated_duration: Duration::from_secs(60),
            prerequisites: Vec::new(),
        }
    }

    pub fn resource_scale() -> Self {
        Self {
            id: "resource_scale",
            kind: ActionKind::Scale,
            severity: ActionSeverity::High,
            description: "Scale up agent resources",
            estimated_duration: Duration::from_secs(120),
            prerequisites: vec![Prerequisite::SpareCapacity],
        }
    }

    pub fn failover() -> Self {
        Self {
            id: "failover",
            kind: ActionKind::Failover,
            severity: ActionSeverity::Critical,
            description: "Fail over to a healthy peer",
            estimated_duration: Duration::from_secs(45),
            prerequisites: vec![Prerequisite::HealthyPeerAvailable],
        }
    }

    /// First prerequisite not satisfied by the fleet, if any
    pub fn unmet_prerequisite(&self, system: &SystemSnapshot) -> Option<Prerequisite> {
        self.prerequisites
            .iter()
            .copied()
            .find(|p| !p.is_met(system))
    }

    /// Suggested re-check delay after a successful run
    fn next_check_in(&self) -> Option<u64> {
        match self.kind {
            ActionKind::Restart | ActionKind::Scale | ActionKind::Failover => {
                Some(self.estimated_duration.as_secs())
            }
            _ => None,
        }
    }

    /// Dispatch to the collaborator responsible for this kind of action
    pub async fn execute(
        &self,
        context: &RecoveryContext,
        infra: &Infrastructure,
        breakers: &CircuitBreakerManager,
    ) -> Result<ActionOutcome> {
        let agent_id = context.agent_id.as_str();
        match self.kind {
            ActionKind::CircuitReset => {
                breakers.reset(agent_id).await;
                Ok(ActionOutcome::success("Circuit breaker reset to closed"))
            }
            ActionKind::Throttle => infra.scheduler.throttle_agent(agent_id, THROTTLE_FACTOR).await,
            ActionKind::TaskRedistribute => {
                infra
                    .scheduler
                    .redistribute_tasks(agent_id, &context.system.healthy_peers)
                    .await
            }
            ActionKind::Restart => infra.processes.restart_agent(agent_id).await,
            ActionKind::Scale => infra.capacity.scale_up(agent_id, SCALE_UNITS).await,
            ActionKind::Failover => match context.system.healthy_peers.first() {
                Some(target) => infra.processes.failover_agent(agent_id, target).await,
                None => Ok(ActionOutcome::failure("No failover target available")),
            },
        }
    }
}

/// Collaborator stand-in that logs each request and reports success
#[derive(Debug, Clone)]
pub struct SimulatedInfrastructure {
    pub spare_capacity: u32,
}

impl Default for SimulatedInfrastructure {
    fn default() -> Self {
        Self { spare_capacity: 4 }
    }
}

#[async_trait]
impl ProcessManager for SimulatedInfrastructure {
    async fn restart_agent(&self, agent_id: &str) -> Result<ActionOutcome> {
        info!("[SIM] Restarting agent {}", agent_id);
        Ok(ActionOutcome::success(format!("Agent {} restarted", agent_id)))
    }

    async fn failover_agent(&self, agent_id: &str, target_id: &str) -> Result<ActionOutcome> {
        info!("[SIM] Failing over {} to {}", agent_id, target_id);
        Ok(ActionOutcome::success(format!("Failed over to {}", target_id)))
    }
}

#[async_trait]
impl TaskScheduler for SimulatedInfrastructure {
    async fn redistribute_tasks(&self, agent_id: &str, peers: &[String]) -> Result<ActionOutcome> {
        info!(
            "[SIM] Redistributing tasks from {} across {} peers",
            agent_id,
            peers.len()
        );
        Ok(ActionOutcome::success(format!("Tasks moved to {} peers", peers.len()))
            .with_metric("peers", peers.len() as f64))
    }

    async fn throttle_agent(&self, agent_id: &str, factor: f64) -> Result<ActionOutcome> {
        info!("[SIM] Throttling {} to {:.0}%", agent_id, factor * 100.0);
        Ok(ActionOutcome::success("Request rate reduced").with_metric("factor", factor))
    }
}

#[async_trait]
impl CapacityProvider for SimulatedInfrastructure {
    async fn available_capacity(&self) -> Result<u32> {
        Ok(self.spare_capacity)
    }

    async fn scale_up(&self, agent_id: &str, units: u32) -> Result<ActionOutcome> {
        info!("[SIM] Scaling {} by {} units", agent_id, units);
        Ok(ActionOutcome::success(format!("Added {} capacity units", units)))
    }
}
