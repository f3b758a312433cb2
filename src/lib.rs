pub mod cli;
pub mod config;
pub mod coordination;
pub mod error;
pub mod services;
pub mod supervisor;

pub use config::AppConfig;
pub use coordination::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitBreakerStatus,
    CircuitState,
};
pub use error::{Result, VigilError};
pub use services::{HealthOverview, HealthService};
pub use supervisor::{
    AgentHealthStatus, HealthAlert, HealthMetricSample, HealthMonitor, Infrastructure,
    RecoveryExecution, RecoverySystem, Watchdog,
};
