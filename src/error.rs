use thiserror::Error;

/// Main error type for the health and recovery engine
#[derive(Error, Debug)]
pub enum VigilError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    // Recovery collaborator errors
    #[error("Infrastructure call failed: {component} - {reason}")]
    Infrastructure { component: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for VigilError
pub type Result<T> = std::result::Result<T, VigilError>;

impl VigilError {
    /// Shorthand for an infrastructure failure reported by a collaborator
    pub fn infrastructure(component: &str, reason: impl Into<String>) -> Self {
        VigilError::Infrastructure {
            component: component.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_joins_messages() {
        let err = VigilError::InvalidConfig(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "Invalid configuration: a; b");
    }

    #[test]
    fn test_infrastructure_display() {
        let err = VigilError::infrastructure("scheduler", "queue unavailable");
        assert_eq!(
            err.to_string(),
            "Infrastructure call failed: scheduler - queue unavailable"
        );
    }
}
