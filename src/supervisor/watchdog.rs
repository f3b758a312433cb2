//! Recovery Watchdog
//!
//! Periodically sweeps every agent known to the health monitor and asks the
//! recovery system to evaluate it. Sweeps run agents concurrently.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::health_monitor::HealthMonitor;
use super::recovery::{RecoveryExecution, RecoverySystem};

/// Configuration for the watchdog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Interval between sweeps (default: 30s)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    30
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Event emitted by watchdog
#[derive(Debug, Clone)]
pub enum WatchdogEvent {
    /// A sweep started a recovery for an agent
    RecoveryTriggered {
        agent_id: String,
        execution_id: String,
        strategy_id: String,
    },
    /// A sweep finished
    SweepCompleted { agents_checked: usize, triggered: usize },
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub agents_checked: usize,
    pub executions: Vec<RecoveryExecution>,
}

/// Watchdog daemon driving recovery evaluation
pub struct Watchdog {
    config: WatchdogConfig,
    monitor: Arc<HealthMonitor>,
    recovery: Arc<RecoverySystem>,
    event_tx: broadcast::Sender<WatchdogEvent>,
    running: Arc<AtomicBool>,
}

impl Watchdog {
    /// Create a new watchdog
    pub fn new(
        config: WatchdogConfig,
        monitor: Arc<HealthMonitor>,
        recovery: Arc<RecoverySystem>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            config,
            monitor,
            recovery,
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to watchdog events
    pub fn subscribe(&self) -> broadcast::Receiver<WatchdogEvent> {
        self.event_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Evaluate recovery for every known agent once
    pub async fn sweep(&self) -> SweepReport {
        sweep_agents(&self.monitor, &self.recovery, &self.event_tx).await
    }

    /// Start sweeping on a background task.
    ///
    /// Returns `None` when disabled or already running.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            info!("Watchdog disabled by configuration");
            return None;
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return None;
        }
        info!(
            "Watchdog started, sweeping every {}s",
            self.config.sweep_interval_secs
        );

        let interval = Duration::from_secs(self.config.sweep_interval_secs.max(1));
        let monitor = self.monitor.clone();
        let recovery = self.recovery.clone();
        let event_tx = self.event_tx.clone();
        let running = self.running.clone();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            while running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                sweep_agents(&monitor, &recovery, &event_tx).await;
            }
            info!("Watchdog stopped");
        }))
    }

    /// Stop after the current sweep
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

async fn sweep_agents(
    monitor: &HealthMonitor,
    recovery: &RecoverySystem,
    event_tx: &broadcast::Sender<WatchdogEvent>,
) -> SweepReport {
    let agents = monitor.agent_ids();
    let outcomes = join_all(agents.iter().map(|agent| recovery.evaluate_recovery(agent))).await;

    let executions: Vec<RecoveryExecution> = outcomes.into_iter().flatten().collect();
    for execution in &executions {
        let _ = event_tx.send(WatchdogEvent::RecoveryTriggered {
            agent_id: execution.agent_id.clone(),
            execution_id: execution.id.clone(),
            strategy_id: execution.strategy_id.clone(),
        });
    }

    debug!(
        "Sweep checked {} agents, triggered {} recoveries",
        agents.len(),
        executions.len()
    );
    let _ = event_tx.send(WatchdogEvent::SweepCompleted {
        agents_checked: agents.len(),
        triggered: executions.len(),
    });

    SweepReport {
        agents_checked: agents.len(),
        executions,
    }
}
