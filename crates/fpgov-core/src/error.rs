//! Error handling for fpgov
//!
//! Provides the unified error type used across all fpgov components, plus the
//! narrower error enums that individual collaborators return.

use crate::types::PrecisionTier;
use std::time::Duration;

/// Result type alias for fpgov operations
pub type Result<T> = std::result::Result<T, Error>;

/// Failure to read a telemetry sample from the device
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TelemetryError {
    /// Device unreachable (busy, permissions, no such device)
    #[error("Telemetry unavailable: {0}")]
    Unavailable(String),

    /// The device answered but the reading could not be interpreted
    #[error("Malformed telemetry reading: {0}")]
    Malformed(String),

    /// The device read did not complete in time
    #[error("Telemetry read timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure to apply an optimization profile to the runtime
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApplyError {
    /// The hardware or runtime cannot honor the requested tier
    #[error("Precision tier {0} is not supported by the runtime")]
    Unsupported(PrecisionTier),

    /// The runtime rejected the change for another reason
    #[error("Failed to apply optimization profile: {0}")]
    Failed(String),
}

/// Configuration validation failures. These are fatal at startup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// `low_threshold` must be strictly below `high_threshold`
    #[error("Invalid thresholds: low_threshold ({low}) must be less than high_threshold ({high})")]
    InvalidThresholds { low: f64, high: f64 },

    /// Any other out-of-range option
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Unified error type for fpgov
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed workload descriptor; the submission is rejected
    #[error("Invalid workload: {0}")]
    InvalidWorkload(String),

    /// Telemetry read failures
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// Optimization apply failures
    #[error(transparent)]
    Apply(#[from] ApplyError),

    /// Configuration validation failures
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// Governor lifecycle errors (already started, stopped, task failure)
    #[error("Governor error: {0}")]
    Governor(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Configuration source errors
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid workload error
    pub fn invalid_workload(msg: impl Into<String>) -> Self {
        Self::InvalidWorkload(msg.into())
    }

    /// Create a governor lifecycle error
    pub fn governor(msg: impl Into<String>) -> Self {
        Self::Governor(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(ConfigError::Invalid(msg.into()))
    }

    /// Whether the governor can keep running after this error.
    ///
    /// Workload and telemetry errors degrade gracefully, apply errors are
    /// handled by the Wide fallback. Configuration errors are fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InvalidWorkload(_) | Error::Telemetry(_) | Error::Apply(_)
        )
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::InvalidWorkload(_) => "invalid_workload",
            Error::Telemetry(TelemetryError::Unavailable(_)) => "telemetry_unavailable",
            Error::Telemetry(_) => "telemetry",
            Error::Apply(ApplyError::Unsupported(_)) => "apply_unsupported",
            Error::Apply(_) => "apply",
            Error::Configuration(ConfigError::InvalidThresholds { .. }) => "invalid_thresholds",
            Error::Configuration(_) => "configuration",
            Error::Governor(_) => "governor",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Yaml(_) => "yaml",
            Error::Config(_) => "config",
            Error::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::invalid_workload("element_count must be positive");
        assert!(matches!(err, Error::InvalidWorkload(_)));
        assert_eq!(
            err.to_string(),
            "Invalid workload: element_count must be positive"
        );
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::invalid_workload("x").category(), "invalid_workload");
        assert_eq!(
            Error::from(TelemetryError::Unavailable("busy".into())).category(),
            "telemetry_unavailable"
        );
        assert_eq!(
            Error::from(ApplyError::Unsupported(PrecisionTier::Narrow)).category(),
            "apply_unsupported"
        );
        assert_eq!(
            Error::from(ConfigError::InvalidThresholds { low: 0.8, high: 0.2 }).category(),
            "invalid_thresholds"
        );
    }

    #[test]
    fn test_error_recoverability() {
        assert!(Error::invalid_workload("x").is_recoverable());
        assert!(Error::from(TelemetryError::Timeout(Duration::from_secs(1))).is_recoverable());
        assert!(Error::from(ApplyError::Failed("driver".into())).is_recoverable());
        assert!(!Error::from(ConfigError::InvalidThresholds { low: 1.0, high: 0.5 }).is_recoverable());
        assert!(!Error::config("bad").is_recoverable());
    }

    #[test]
    fn test_nested_display_is_transparent() {
        let err = Error::from(ApplyError::Unsupported(PrecisionTier::Narrow));
        assert_eq!(
            err.to_string(),
            "Precision tier Narrow is not supported by the runtime"
        );

        let err = Error::from(ConfigError::InvalidThresholds { low: 0.7, high: 0.3 });
        assert!(err.to_string().contains("low_threshold (0.7)"));
    }
}
