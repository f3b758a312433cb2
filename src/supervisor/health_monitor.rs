//! Agent Health Monitor
//!
//! Ingests periodic metric samples per agent into a bounded history, scores
//! them, and keeps each agent's alert book current. Trends and predictions
//! are derived on every status query rather than stored.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use super::alert_manager::{evaluate_rules, AlertBook, HealthAlert};
use super::metrics::HealthMetricSample;
use super::prediction::{predict_health, HealthPrediction};
use super::trend::{compute_trends, HealthTrend};

/// Configuration for the health monitor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthMonitorConfig {
    /// Samples retained per agent (oldest evicted first)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Samples used for per-metric trend fitting
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,
    /// Samples used for health extrapolation (also the minimum required)
    #[serde(default = "default_prediction_window")]
    pub prediction_window: usize,
    /// Assumed spacing between samples when extrapolating
    #[serde(default = "default_sample_interval_minutes")]
    pub sample_interval_minutes: u32,
    #[serde(default = "default_prediction_horizons")]
    pub prediction_horizons_minutes: Vec<u32>,
    /// Unresolved alerts older than this are auto-resolved
    #[serde(default = "default_alert_staleness_secs")]
    pub alert_staleness_secs: u64,
    #[serde(default = "default_max_alerts_per_agent")]
    pub max_alerts_per_agent: usize,
    /// Run alert analysis synchronously inside `add_sample`
    #[serde(default = "default_analyze_on_ingest")]
    pub analyze_on_ingest: bool,
}

fn default_history_limit() -> usize {
    1000
}

fn default_trend_window() -> usize {
    20
}

fn default_prediction_window() -> usize {
    10
}

fn default_sample_interval_minutes() -> u32 {
    5
}

fn default_prediction_horizons() -> Vec<u32> {
    vec![15, 60]
}

fn default_alert_staleness_secs() -> u64 {
    3600
}

fn default_max_alerts_per_agent() -> usize {
    200
}

fn default_analyze_on_ingest() -> bool {
    true
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            trend_window: default_trend_window(),
            prediction_window: default_prediction_window(),
            sample_interval_minutes: default_sample_interval_minutes(),
            prediction_horizons_minutes: default_prediction_horizons(),
            alert_staleness_secs: default_alert_staleness_secs(),
            max_alerts_per_agent: default_max_alerts_per_agent(),
            analyze_on_ingest: default_analyze_on_ingest(),
        }
    }
}

impl HealthMonitorConfig {
    fn alert_staleness(&self) -> Duration {
        Duration::seconds(self.alert_staleness_secs.min(u32::MAX as u64) as i64)
    }
}

/// Coarse health classification of a composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Critical,
}

impl HealthLevel {
    pub fn from_score(score: f64) -> Self {
        if score < 0.3 {
            HealthLevel::Critical
        } else if score < 0.6 {
            HealthLevel::Degraded
        } else {
            HealthLevel::Healthy
        }
    }
}

impl std::fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthLevel::Healthy => write!(f, "healthy"),
            HealthLevel::Degraded => write!(f, "degraded"),
            HealthLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Full health view of one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealthStatus {
    pub agent_id: String,
    pub health_score: f64,
    pub level: HealthLevel,
    pub latest: HealthMetricSample,
    pub sample_count: usize,
    pub trends: Vec<HealthTrend>,
    /// Unresolved alerts, oldest first
    pub alerts: Vec<HealthAlert>,
    pub predictions: Vec<HealthPrediction>,
    pub last_updated: DateTime<Utc>,
}

impl AgentHealthStatus {
    pub fn has_degrading_trend(&self) -> bool {
        self.trends.iter().any(HealthTrend::is_degrading)
    }
}

/// Cheap per-agent summary used for fleet-wide aggregates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agent_id: String,
    pub health_score: f64,
    pub level: HealthLevel,
    pub queue_depth: f64,
}

#[derive(Debug)]
struct AgentHistory {
    samples: VecDeque<HealthMetricSample>,
    alerts: AlertBook,
}

impl AgentHistory {
    fn new(config: &HealthMonitorConfig) -> Self {
        Self {
            samples: VecDeque::with_capacity(config.history_limit.min(1024)),
            alerts: AlertBook::new(config.max_alerts_per_agent),
        }
    }

    fn push(&mut self, sample: HealthMetricSample, limit: usize) {
        self.samples.push_back(sample);
        while self.samples.len() > limit.max(1) {
            self.samples.pop_front();
        }
    }

    /// Raise alerts for the latest sample, then snooze stale ones
    fn analyze(
        &mut self,
        agent_id: &str,
        config: &HealthMonitorConfig,
        now: DateTime<Utc>,
    ) -> Vec<HealthAlert> {
        let Some(latest) = self.samples.back() else {
            return Vec::new();
        };

        let raised: Vec<HealthAlert> = evaluate_rules(latest, latest.health_score())
            .iter()
            .filter_map(|candidate| self.alerts.raise(agent_id, candidate, now))
            .collect();

        self.alerts.resolve_stale(now, config.alert_staleness());
        raised
    }

    fn status(&self, agent_id: &str, config: &HealthMonitorConfig) -> Option<AgentHealthStatus> {
        let latest = self.samples.back()?.clone();
        let health_score = latest.health_score();

        let trends = compute_trends(self.samples.iter(), config.trend_window);

        let skip = self.samples.len().saturating_sub(config.prediction_window);
        let scores: Vec<f64> = self
            .samples
            .iter()
            .skip(skip)
            .map(HealthMetricSample::health_score)
            .collect();
        let predictions = config
            .prediction_horizons_minutes
            .iter()
            .filter_map(|horizon| {
                predict_health(
                    &latest,
                    &scores,
                    *horizon,
                    config.sample_interval_minutes,
                    config.prediction_window,
                )
            })
            .collect();

        Some(AgentHealthStatus {
            agent_id: agent_id.to_string(),
            health_score,
            level: HealthLevel::from_score(health_score),
            last_updated: latest.timestamp,
            latest,
            sample_count: self.samples.len(),
            trends,
            alerts: self.alerts.unresolved(),
            predictions,
        })
    }
}

/// Health monitor for all agents
pub struct HealthMonitor {
    config: HealthMonitorConfig,
    agents: DashMap<String, Arc<Mutex<AgentHistory>>>,
    alert_tx: broadcast::Sender<HealthAlert>,
}

impl HealthMonitor {
    /// Create a new health monitor
    pub fn new(config: HealthMonitorConfig) -> Self {
        let (alert_tx, _) = broadcast::channel(256);
        Self {
            config,
            agents: DashMap::new(),
            alert_tx,
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(HealthMonitorConfig::default())
    }

    pub fn config(&self) -> &HealthMonitorConfig {
        &self.config
    }

    /// Subscribe to newly raised alerts
    pub fn subscribe(&self) -> broadcast::Receiver<HealthAlert> {
        self.alert_tx.subscribe()
    }

    fn history(&self, agent_id: &str) -> Option<Arc<Mutex<AgentHistory>>> {
        self.agents.get(agent_id).map(|entry| entry.value().clone())
    }

    fn history_or_create(&self, agent_id: &str) -> Arc<Mutex<AgentHistory>> {
        if let Some(existing) = self.history(agent_id) {
            return existing;
        }
        self.agents
            .entry(agent_id.to_string())
            .or_insert_with(|| {
                debug!("Tracking health for new agent {}", agent_id);
                Arc::new(Mutex::new(AgentHistory::new(&self.config)))
            })
            .value()
            .clone()
    }

    fn publish(&self, alerts: &[HealthAlert]) {
        for alert in alerts {
            // No subscribers is fine
            let _ = self.alert_tx.send(alert.clone());
        }
    }

    /// Append a sample and, unless disabled, analyze immediately.
    ///
    /// Returns the alerts newly raised by this sample.
    pub async fn add_sample(&self, sample: HealthMetricSample) -> Vec<HealthAlert> {
        let agent_id = sample.agent_id.clone();
        let history = self.history_or_create(&agent_id);

        let raised = {
            let mut guard = history.lock().await;
            guard.push(sample, self.config.history_limit);
            if self.config.analyze_on_ingest {
                guard.analyze(&agent_id, &self.config, Utc::now())
            } else {
                Vec::new()
            }
        };

        self.publish(&raised);
        raised
    }

    /// Run alert analysis for an agent now
    pub async fn analyze(&self, agent_id: &str) -> Vec<HealthAlert> {
        self.analyze_at(agent_id, Utc::now()).await
    }

    /// Run alert analysis as of `now`
    pub async fn analyze_at(&self, agent_id: &str, now: DateTime<Utc>) -> Vec<HealthAlert> {
        let Some(history) = self.history(agent_id) else {
            return Vec::new();
        };
        let raised = history.lock().await.analyze(agent_id, &self.config, now);
        self.publish(&raised);
        raised
    }

    /// Current health of an agent, `None` until its first sample
    pub async fn health_status(&self, agent_id: &str) -> Option<AgentHealthStatus> {
        let history = self.history(agent_id)?;
        let guard = history.lock().await;
        guard.status(agent_id, &self.config)
    }

    /// Health of every agent with samples, sorted by agent id
    pub async fn all_health_statuses(&self) -> Vec<AgentHealthStatus> {
        let mut statuses = Vec::new();
        for agent_id in self.agent_ids() {
            if let Some(status) = self.health_status(&agent_id).await {
                statuses.push(status);
            }
        }
        statuses
    }

    /// Latest score and queue depth per agent, without trend fitting
    pub async fn fleet_summary(&self) -> Vec<AgentSnapshot> {
        let mut snapshots = Vec::new();
        for agent_id in self.agent_ids() {
            let Some(history) = self.history(&agent_id) else {
                continue;
            };
            let guard = history.lock().await;
            if let Some(latest) = guard.samples.back() {
                let health_score = latest.health_score();
                snapshots.push(AgentSnapshot {
                    agent_id,
                    health_score,
                    level: HealthLevel::from_score(health_score),
                    queue_depth: latest.queue_depth,
                });
            }
        }
        snapshots
    }

    /// Resolve an alert by id across all agents
    pub async fn resolve_alert(&self, alert_id: &str) -> bool {
        let histories: Vec<Arc<Mutex<AgentHistory>>> =
            self.agents.iter().map(|e| e.value().clone()).collect();
        let now = Utc::now();
        for history in histories {
            if history.lock().await.alerts.resolve(alert_id, now) {
                debug!("Alert {} resolved manually", alert_id);
                return true;
            }
        }
        false
    }

    /// Every alert ever kept for an agent, resolved included
    pub async fn alert_history(&self, agent_id: &str) -> Vec<HealthAlert> {
        match self.history(agent_id) {
            Some(history) => history.lock().await.alerts.all().to_vec(),
            None => Vec::new(),
        }
    }

    pub async fn sample_count(&self, agent_id: &str) -> usize {
        match self.history(agent_id) {
            Some(history) => history.lock().await.samples.len(),
            None => 0,
        }
    }

    /// Known agent ids, sorted
    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}
