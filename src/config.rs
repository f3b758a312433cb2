use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::coordination::CircuitBreakerConfig;
use crate::supervisor::recovery::MAX_ACTION_TIMEOUT_FACTOR;
use crate::supervisor::{HealthMonitorConfig, RecoveryConfig, WatchdogConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub health: HealthMonitorConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for the daily rolling log file (console only when unset)
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default values
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("VIGIL_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (VIGIL_CIRCUIT_BREAKER__FAILURE_THRESHOLD, etc.)
            .add_source(
                Environment::with_prefix("VIGIL")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let cb = &self.circuit_breaker;
        if cb.failure_threshold == 0 {
            errors.push("circuit_breaker.failure_threshold must be at least 1".to_string());
        }
        if cb.success_threshold == 0 {
            errors.push("circuit_breaker.success_threshold must be at least 1".to_string());
        }

        let health = &self.health;
        if health.history_limit == 0 {
            errors.push("health.history_limit must be positive".to_string());
        }
        if health.trend_window < 3 {
            errors.push("health.trend_window must be at least 3".to_string());
        }
        if health.prediction_window < 2 {
            errors.push("health.prediction_window must be at least 2".to_string());
        }
        if health.trend_window > health.history_limit
            || health.prediction_window > health.history_limit
        {
            errors.push("health windows must not exceed health.history_limit".to_string());
        }
        if health.sample_interval_minutes == 0 {
            errors.push("health.sample_interval_minutes must be positive".to_string());
        }
        if health.prediction_horizons_minutes.is_empty() {
            errors.push("health.prediction_horizons_minutes must not be empty".to_string());
        }

        let recovery = &self.recovery;
        if recovery.max_executions == 0 {
            errors.push("recovery.max_executions must be positive".to_string());
        }
        let factor = recovery.action_timeout_factor;
        if !factor.is_finite() || factor <= 0.0 || factor > MAX_ACTION_TIMEOUT_FACTOR {
            errors.push(format!(
                "recovery.action_timeout_factor must be in (0, {}]",
                MAX_ACTION_TIMEOUT_FACTOR
            ));
        }

        if self.watchdog.enabled && self.watchdog.sweep_interval_secs == 0 {
            errors.push("watchdog.sweep_interval_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
