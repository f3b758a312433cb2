//! Synthetic fleet simulation for `vigil simulate`.
//!
//! Drives a handful of agents through the health service, degrading some of
//! them over time, and lets the watchdog trigger recoveries. A completed
//! recovery relieves most of the stress on the agent it ran for.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tabled::Tabled;
use tracing::{debug, info};

use super::output::{self, OutputMode};
use crate::coordination::CircuitBreakerStatus;
use crate::services::{HealthOverview, HealthService};
use crate::supervisor::{
    AgentHealthStatus, ExecutionStatus, HealthMetricSample, RecoveryExecution, Watchdog,
};

/// Requests each agent serves per tick
const REQUESTS_PER_TICK: usize = 5;
/// Share of stress left after a completed recovery
const RECOVERY_RELIEF: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub agents: usize,
    pub ticks: usize,
    pub seed: Option<u64>,
    /// Number of agents that degrade over the run
    pub degrade: usize,
}

#[derive(Debug)]
struct SimAgent {
    id: String,
    base_response_ms: f64,
    base_error_rate: f64,
    degrading: bool,
    stress: f64,
}

impl SimAgent {
    fn sample(&self, rng: &mut StdRng) -> HealthMetricSample {
        let s = self.stress;
        let response = self.base_response_ms * (1.0 + 6.0 * s) + rng.gen_range(-20.0..20.0);
        let errors = self.base_error_rate + 0.4 * s + rng.gen_range(-0.01..0.01);
        let completion = 0.97 - 0.6 * s + rng.gen_range(-0.01..0.01);
        let queue = 1.0 + 18.0 * s + rng.gen_range(-0.5..0.5);

        HealthMetricSample::new(
            &self.id,
            response.max(1.0),
            errors.clamp(0.0, 1.0),
            completion.clamp(0.0, 1.0),
            queue.max(0.0),
        )
    }
}

/// Everything produced by a simulation run
#[derive(Debug, Clone)]
pub struct SimulationReport {
    pub seed: u64,
    pub executions: Vec<RecoveryExecution>,
    pub statuses: Vec<AgentHealthStatus>,
    pub circuits: Vec<CircuitBreakerStatus>,
    pub overview: HealthOverview,
}

pub async fn run_simulation(
    service: &HealthService,
    watchdog: &Watchdog,
    options: &SimulationOptions,
) -> SimulationReport {
    let seed = options.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    info!(
        "Simulating {} agents for {} ticks (seed {})",
        options.agents, options.ticks, seed
    );

    let mut agents: Vec<SimAgent> = (0..options.agents)
        .map(|i| SimAgent {
            id: format!("agent-{:02}", i),
            base_response_ms: rng.gen_range(150.0..400.0),
            base_error_rate: rng.gen_range(0.01..0.03),
            degrading: i < options.degrade,
            stress: 0.0,
        })
        .collect();

    let onset = options.ticks / 5;
    for tick in 0..options.ticks {
        for agent in agents.iter_mut() {
            if agent.degrading && tick >= onset {
                agent.stress = (agent.stress + rng.gen_range(0.03..0.08)).min(1.0);
            }

            let sample = agent.sample(&mut rng);
            let error_rate = sample.error_rate;
            service.ingest_metric_sample(sample).await;

            for _ in 0..REQUESTS_PER_TICK {
                let success = rng.gen::<f64>() >= error_rate;
                let error = (!success).then_some("request failed");
                service.record_agent_outcome(&agent.id, success, error).await;
            }
        }

        let report = watchdog.sweep().await;
        for execution in &report.executions {
            if execution.status == ExecutionStatus::Completed {
                if let Some(agent) = agents.iter_mut().find(|a| a.id == execution.agent_id) {
                    agent.stress *= RECOVERY_RELIEF;
                }
            }
        }
        debug!("Tick {} triggered {} recoveries", tick, report.executions.len());
    }

    SimulationReport {
        seed,
        executions: service.get_recent_executions(usize::MAX).await,
        statuses: service.get_all_health_statuses().await,
        circuits: service.all_circuit_statuses().await,
        overview: service.overview().await,
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct ExecutionRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Agent")]
    pub agent: String,
    #[tabled(rename = "Strategy")]
    pub strategy: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Progress")]
    pub progress: String,
    #[tabled(rename = "Actions OK")]
    pub actions: String,
    #[tabled(rename = "Error")]
    pub error: String,
}

impl From<&RecoveryExecution> for ExecutionRow {
    fn from(e: &RecoveryExecution) -> Self {
        let succeeded = e.results.iter().filter(|r| r.success).count();
        Self {
            id: output::short_id(&e.id),
            agent: e.agent_id.clone(),
            strategy: e.strategy_id.clone(),
            status: e.status.to_string(),
            progress: format!("{}%", e.progress),
            actions: format!("{}/{}", succeeded, e.results.len()),
            error: e.error.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct HealthRow {
    #[tabled(rename = "Agent")]
    pub agent: String,
    #[tabled(rename = "Score")]
    pub score: String,
    #[tabled(rename = "Level")]
    pub level: String,
    #[tabled(rename = "Error rate")]
    pub error_rate: String,
    #[tabled(rename = "Queue")]
    pub queue: String,
    #[tabled(rename = "Circuit")]
    pub circuit: String,
    #[tabled(rename = "Alerts")]
    pub alerts: usize,
    #[tabled(rename = "Degrading")]
    pub degrading: String,
}

impl HealthRow {
    fn new(status: &AgentHealthStatus, circuits: &[CircuitBreakerStatus]) -> Self {
        let circuit = circuits
            .iter()
            .find(|c| c.agent_id == status.agent_id)
            .map(|c| c.state.to_string())
            .unwrap_or_else(|| "-".to_string());
        let degrading: Vec<String> = status
            .trends
            .iter()
            .filter(|t| t.is_degrading())
            .map(|t| t.metric.to_string())
            .collect();

        Self {
            agent: status.agent_id.clone(),
            score: format!("{:.3}", status.health_score),
            level: status.level.to_string(),
            error_rate: output::percent(status.latest.error_rate),
            queue: format!("{:.1}", status.latest.queue_depth),
            circuit,
            alerts: status.alerts.len(),
            degrading: degrading.join(", "),
        }
    }
}

/// Print the ledger, fleet health and overview
pub fn print_report(report: &SimulationReport, mode: OutputMode) -> anyhow::Result<()> {
    let executions: Vec<ExecutionRow> = report.executions.iter().map(ExecutionRow::from).collect();
    let health: Vec<HealthRow> = report
        .statuses
        .iter()
        .map(|s| HealthRow::new(s, &report.circuits))
        .collect();

    output::print_items("Recovery executions", &executions, mode)?;
    output::print_items("Fleet health", &health, mode)?;
    if mode == OutputMode::Table {
        println!();
        output::print_kv("seed", &report.seed.to_string());
    }
    output::print_item(&report.overview, mode)
}
