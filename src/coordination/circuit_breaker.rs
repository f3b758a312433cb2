//! Agent Circuit Breaker
//!
//! Failure-counting state machine that gates whether work may be dispatched
//! to a single agent. The breaker itself is a plain value driven by explicit
//! timestamps; [`super::CircuitBreakerManager`] owns one per agent and
//! serializes access to it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all attempts allowed
    Closed,
    /// Failure threshold exceeded - attempts blocked
    Open,
    /// Probation period - attempts allowed while successes are counted
    HalfOpen,
}

impl CircuitState {
    /// Contribution of the state to the breaker health score
    pub fn health_factor(&self) -> f64 {
        match self {
            CircuitState::Closed => 1.0,
            CircuitState::HalfOpen => 0.5,
            CircuitState::Open => 0.0,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Configuration shared by every agent breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures in Closed that trip the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Successes in HalfOpen needed to close the circuit
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Time to wait in Open before allowing a probe (milliseconds)
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    3
}

fn default_reset_timeout_ms() -> u64 {
    60_000
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::milliseconds(self.reset_timeout_ms.min(i64::MAX as u64) as i64)
    }
}

/// Circuit breaker for a single agent
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    agent_id: String,
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    total_requests: u64,
    total_failures: u64,
    total_successes: u64,
    total_trips: u64,
    last_failure_time: Option<DateTime<Utc>>,
    last_success_time: Option<DateTime<Utc>>,
    next_attempt_time: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl CircuitBreaker {
    /// Create a closed breaker for an agent
    pub fn new(agent_id: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            agent_id: agent_id.into(),
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            total_requests: 0,
            total_failures: 0,
            total_successes: 0,
            total_trips: 0,
            last_failure_time: None,
            last_success_time: None,
            next_attempt_time: None,
            last_error: None,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Check whether an attempt is allowed at `now`.
    ///
    /// An Open breaker whose reset timeout has elapsed moves to HalfOpen and
    /// lets this call through.
    pub fn can_attempt_at(&mut self, now: DateTime<Utc>) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => match self.next_attempt_time {
                Some(next) if now >= next => {
                    self.transition_to_half_open();
                    true
                }
                _ => false,
            },
        }
    }

    /// Record a successful call at `now`
    pub fn record_success_at(&mut self, now: DateTime<Utc>) {
        self.total_requests += 1;
        self.total_successes += 1;
        self.last_success_time = Some(now);

        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= self.config.success_threshold {
                    self.close();
                }
            }
            CircuitState::Open => {
                debug!(
                    "Success reported for {} while circuit open, ignoring",
                    self.agent_id
                );
            }
        }
    }

    /// Record a failed call at `now`
    pub fn record_failure_at(&mut self, now: DateTime<Utc>, error: Option<&str>) {
        self.total_requests += 1;
        self.total_failures += 1;
        if let Some(error) = error {
            self.last_error = Some(error.to_string());
        }

        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                self.last_failure_time = Some(now);
                if self.failure_count >= self.config.failure_threshold {
                    self.trip(now);
                }
            }
            CircuitState::HalfOpen => {
                self.failure_count += 1;
                self.last_failure_time = Some(now);
                self.trip(now);
            }
            CircuitState::Open => {
                debug!(
                    "Failure reported for {} while circuit open, ignoring",
                    self.agent_id
                );
            }
        }
    }

    /// Force the breaker back to Closed, keeping lifetime totals
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        self.last_failure_time = None;
        self.next_attempt_time = None;
        info!("Circuit breaker for {} reset to CLOSED", self.agent_id);
    }

    fn trip(&mut self, now: DateTime<Utc>) {
        self.state = CircuitState::Open;
        self.success_count = 0;
        self.next_attempt_time = Some(now + self.config.reset_timeout());
        self.total_trips += 1;
        warn!(
            "Circuit breaker TRIPPED for {} after {} failures",
            self.agent_id, self.failure_count
        );
    }

    fn transition_to_half_open(&mut self) {
        self.state = CircuitState::HalfOpen;
        self.failure_count = 0;
        self.success_count = 0;
        self.next_attempt_time = None;
        info!("Circuit breaker for {} transitioning to HALF-OPEN", self.agent_id);
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        self.last_failure_time = None;
        info!(
            "Circuit breaker for {} CLOSED - normal operation resumed",
            self.agent_id
        );
    }

    /// Lifetime success ratio; 1.0 before any request
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.total_successes as f64 / self.total_requests as f64
        }
    }

    /// Breaker-only health score in [0, 1]
    pub fn health_score_at(&self, now: DateTime<Utc>) -> f64 {
        let recency = match self.last_failure_time {
            None => 1.0,
            Some(last) => {
                let window = self.config.reset_timeout().num_milliseconds() * 2;
                if window <= 0 {
                    1.0
                } else {
                    let elapsed = (now - last).num_milliseconds().max(0);
                    (elapsed as f64 / window as f64).min(1.0)
                }
            }
        };

        let score =
            0.6 * self.success_rate() + 0.2 * recency + 0.2 * self.state.health_factor();
        score.clamp(0.0, 1.0)
    }

    /// Snapshot for queries
    pub fn status_at(&self, now: DateTime<Utc>) -> CircuitBreakerStatus {
        CircuitBreakerStatus {
            agent_id: self.agent_id.clone(),
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            total_requests: self.total_requests,
            total_failures: self.total_failures,
            total_successes: self.total_successes,
            total_trips: self.total_trips,
            last_failure_time: self.last_failure_time,
            last_success_time: self.last_success_time,
            next_attempt_time: self.next_attempt_time,
            last_error: self.last_error.clone(),
            health_score: self.health_score_at(now),
        }
    }
}

/// Point-in-time view of an agent breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    pub agent_id: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_requests: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub total_trips: u64,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
    pub next_attempt_time: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub health_score: f64,
}
