//! Coordination Layer
//!
//! Per-agent circuit breakers that gate whether work may be dispatched:
//! - Failure-counting breaker state machine
//! - Lazily populated registry serializing access per agent

pub mod breaker_registry;
pub mod circuit_breaker;

pub use breaker_registry::CircuitBreakerManager;
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus, CircuitState,
};
