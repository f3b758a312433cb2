//! Supervisor Layer for Agent Health and Recovery
//!
//! This module provides automated supervision infrastructure:
//! - Health monitor for metric history, alerts, trends and predictions
//! - Playbook of recovery strategies and the actions they run
//! - Recovery system executing strategies with cooldowns
//! - Watchdog sweeping the fleet on an interval

pub mod actions;
pub mod alert_manager;
pub mod health_monitor;
pub mod metrics;
pub mod playbook;
pub mod prediction;
pub mod recovery;
pub mod trend;
pub mod watchdog;

pub use actions::{
    ActionKind, ActionOutcome, ActionSeverity, CapacityProvider, Infrastructure, Prerequisite,
    ProcessManager, RecoveryAction, RecoveryResult, SimulatedInfrastructure, TaskScheduler,
};
pub use alert_manager::{AlertSeverity, AlertSubject, HealthAlert};
pub use health_monitor::{
    AgentHealthStatus, AgentSnapshot, HealthLevel, HealthMonitor, HealthMonitorConfig,
};
pub use metrics::{HealthMetric, HealthMetricSample};
pub use playbook::{RecoveryContext, RecoveryPlaybook, RecoveryStrategy, SystemSnapshot};
pub use prediction::HealthPrediction;
pub use recovery::{
    ExecutionStatus, RecoveryConfig, RecoveryEvent, RecoveryExecution, RecoverySystem,
};
pub use trend::{HealthTrend, TrendDirection};
pub use watchdog::{SweepReport, Watchdog, WatchdogConfig, WatchdogEvent};
