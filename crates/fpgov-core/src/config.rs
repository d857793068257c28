//! Configuration management for fpgov
//!
//! Provides a layered configuration system that supports YAML files and
//! environment variable overrides.

use crate::error::ConfigError;
use crate::types::{OperationKind, PrecisionTier};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "FPGOV_CONFIG";

/// Governor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Scores below this move the governor to the efficient tier
    pub low_threshold: f64,

    /// Scores above this move the governor back to Wide
    pub high_threshold: f64,

    /// Minimum time between two tier transitions, in milliseconds
    pub cooldown_ms: u64,

    /// Telemetry sampling period, in milliseconds
    pub sample_interval_ms: u64,

    /// Tier in effect before any workload has been evaluated
    pub default_tier: PrecisionTier,

    /// Tier chosen when the engine favours energy efficiency
    pub efficient_tier: PrecisionTier,

    /// Periodic re-evaluation of the last score, in milliseconds
    pub reevaluate_interval_ms: u64,

    /// Capacity of the sample and decision ring buffers
    pub history_capacity: usize,

    /// Number of recent samples in the rolling summary
    pub summary_window: usize,

    /// Extra telemetry attempts allowed within one cycle
    pub max_retries_per_cycle: u32,

    /// Consecutive failed cycles before telemetry is disabled
    pub disable_after_failures: u32,

    /// Timeout for a single device read, in milliseconds
    pub sample_timeout_ms: u64,

    /// Grace period for a clean stop, in milliseconds
    pub shutdown_grace_ms: u64,

    /// How long a rejected tier stays pinned before it is probed again, in milliseconds
    pub capability_recheck_ms: u64,

    /// Assumed Wide-tier power draw when none has been observed
    pub baseline_power_watts: f64,

    /// Complexity analyzer tuning
    pub analyzer: AnalyzerConfig,
}

/// Complexity analyzer tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Total elements (element_count x batch_size) at which the size factor saturates
    pub saturation_elements: u64,

    /// Added to the score when the adapter hints at Float64 data
    pub float64_bias: f64,

    /// Operation weight table
    pub op_weights: OperationWeights,
}

/// Weight of each operation kind, each within `[0, 1]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationWeights {
    pub matmul: f64,
    pub convolution: f64,
    pub attention: f64,
    pub reduction: f64,
    pub elementwise: f64,
    pub other: f64,
}

impl OperationWeights {
    /// Weight for an operation kind
    pub fn weight(&self, op: OperationKind) -> f64 {
        match op {
            OperationKind::MatMul => self.matmul,
            OperationKind::Convolution => self.convolution,
            OperationKind::Attention => self.attention,
            OperationKind::Reduction => self.reduction,
            OperationKind::Elementwise => self.elementwise,
            OperationKind::Other => self.other,
        }
    }
}

impl Default for OperationWeights {
    fn default() -> Self {
        Self {
            matmul: 1.0,
            convolution: 0.95,
            attention: 1.0,
            reduction: 0.5,
            elementwise: 0.25,
            other: 0.5,
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            // 4096 x 4096 x 8
            saturation_elements: 1 << 27,
            float64_bias: 0.2,
            op_weights: OperationWeights::default(),
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.saturation_elements < 2 {
            return Err(ConfigError::Invalid(
                "analyzer.saturation_elements must be at least 2".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.float64_bias) {
            return Err(ConfigError::Invalid(
                "analyzer.float64_bias must be between 0 and 1".to_string(),
            ));
        }
        for op in OperationKind::ALL {
            let weight = self.op_weights.weight(op);
            if !(0.0..=1.0).contains(&weight) {
                return Err(ConfigError::Invalid(format!(
                    "analyzer.op_weights.{} must be between 0 and 1, got {}",
                    op, weight
                )));
            }
        }
        Ok(())
    }
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            low_threshold: 0.3,
            high_threshold: 0.7,
            cooldown_ms: 5_000,
            sample_interval_ms: 1_000,
            default_tier: PrecisionTier::Wide,
            efficient_tier: PrecisionTier::Narrow,
            reevaluate_interval_ms: 10_000,
            history_capacity: 512,
            summary_window: 5,
            max_retries_per_cycle: 2,
            disable_after_failures: 5,
            sample_timeout_ms: 2_000,
            shutdown_grace_ms: 3_000,
            capability_recheck_ms: 60_000,
            baseline_power_watts: 100.0,
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl GovernorConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables, `FPGOV_<FIELD>` (nested fields use `__`)
    /// 2. Configuration file (`FPGOV_CONFIG`, else `./fpgov.yaml`)
    /// 3. Defaults (lowest)
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
            debug!("Loading configuration from {}", config_path);
            builder = builder.add_source(config::File::with_name(&config_path).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("fpgov").required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("FPGOV")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let parsed: Self = builder.build()?.try_deserialize()?;
        parsed.validate()?;

        Ok(parsed)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        debug!("Loading configuration from {}", path.display());
        let builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::File::from(path));

        let parsed: Self = builder.build()?.try_deserialize()?;
        parsed.validate()?;

        Ok(parsed)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        for (name, value) in [
            ("low_threshold", self.low_threshold),
            ("high_threshold", self.high_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }

        if self.low_threshold >= self.high_threshold {
            return Err(ConfigError::InvalidThresholds {
                low: self.low_threshold,
                high: self.high_threshold,
            });
        }

        if self.efficient_tier.is_wide() {
            return Err(ConfigError::Invalid(
                "efficient_tier must be a reduced precision tier".to_string(),
            ));
        }

        for (name, value) in [
            ("sample_interval_ms", self.sample_interval_ms),
            ("reevaluate_interval_ms", self.reevaluate_interval_ms),
            ("sample_timeout_ms", self.sample_timeout_ms),
            ("shutdown_grace_ms", self.shutdown_grace_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history_capacity must be greater than zero".to_string(),
            ));
        }

        if self.summary_window == 0 || self.summary_window > self.history_capacity {
            return Err(ConfigError::Invalid(format!(
                "summary_window must be between 1 and history_capacity ({})",
                self.history_capacity
            )));
        }

        if self.disable_after_failures == 0 {
            return Err(ConfigError::Invalid(
                "disable_after_failures must be greater than zero".to_string(),
            ));
        }

        if self.baseline_power_watts.is_nan() || self.baseline_power_watts <= 0.0 {
            return Err(ConfigError::Invalid(
                "baseline_power_watts must be positive".to_string(),
            ));
        }

        self.analyzer.validate()
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn reevaluate_interval(&self) -> Duration {
        Duration::from_millis(self.reevaluate_interval_ms)
    }

    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn capability_recheck(&self) -> Duration {
        Duration::from_millis(self.capability_recheck_ms)
    }

    /// Set the threshold pair
    pub fn with_thresholds(mut self, low: f64, high: f64) -> Self {
        self.low_threshold = low;
        self.high_threshold = high;
        self
    }

    /// Set the cooldown
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown_ms = cooldown.as_millis() as u64;
        self
    }

    /// Set the sampling interval
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Set the default tier
    pub fn with_default_tier(mut self, tier: PrecisionTier) -> Self {
        self.default_tier = tier;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{Builder, NamedTempFile};

    fn yaml_file() -> NamedTempFile {
        Builder::new().suffix(".yaml").tempfile().unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = GovernorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_tier, PrecisionTier::Wide);
        assert_eq!(config.cooldown(), Duration::from_secs(5));
        assert_eq!(config.sample_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_inverted_thresholds_are_rejected() {
        let config = GovernorConfig::default().with_thresholds(0.8, 0.2);
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidThresholds { low: 0.8, high: 0.2 })
        );

        let config = GovernorConfig::default().with_thresholds(0.5, 0.5);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThresholds { .. })
        ));
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let config = GovernorConfig::default().with_thresholds(-0.1, 0.5);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = GovernorConfig::default();
        config.sample_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = GovernorConfig::default();
        config.efficient_tier = PrecisionTier::Wide;
        assert!(config.validate().is_err());

        let mut config = GovernorConfig::default();
        config.summary_window = config.history_capacity + 1;
        assert!(config.validate().is_err());

        let mut config = GovernorConfig::default();
        config.analyzer.op_weights.matmul = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("matmul"));
    }

    #[test]
    fn test_builder() {
        let config = GovernorConfig::default()
            .with_thresholds(0.05, 0.9)
            .with_cooldown(Duration::from_millis(250))
            .with_sample_interval(Duration::from_millis(100))
            .with_default_tier(PrecisionTier::Narrow);

        assert_eq!(config.low_threshold, 0.05);
        assert_eq!(config.high_threshold, 0.9);
        assert_eq!(config.cooldown_ms, 250);
        assert_eq!(config.sample_interval_ms, 100);
        assert_eq!(config.default_tier, PrecisionTier::Narrow);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = GovernorConfig::default();
        let yaml = config.to_yaml().unwrap();
        let parsed: GovernorConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = yaml_file();
        writeln!(
            file,
            "low_threshold: 0.1\nhigh_threshold: 0.6\ncooldown_ms: 1500\ndefault_tier: narrow\nanalyzer:\n  float64_bias: 0.1"
        )
        .unwrap();

        let config = GovernorConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.low_threshold, 0.1);
        assert_eq!(config.high_threshold, 0.6);
        assert_eq!(config.cooldown_ms, 1500);
        assert_eq!(config.default_tier, PrecisionTier::Narrow);
        assert_eq!(config.analyzer.float64_bias, 0.1);
        // untouched values keep their defaults
        assert_eq!(config.sample_interval_ms, 1000);
        assert_eq!(config.analyzer.op_weights.matmul, 1.0);
    }

    #[test]
    fn test_load_from_file_rejects_bad_thresholds() {
        let mut file = yaml_file();
        writeln!(file, "low_threshold: 0.9\nhigh_threshold: 0.1").unwrap();

        let err = GovernorConfig::load_from_file(file.path()).unwrap_err();
        assert_eq!(err.category(), "invalid_thresholds");
    }
}
