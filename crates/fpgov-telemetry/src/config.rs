//! Telemetry sampler configuration

use fpgov_core::GovernorConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Telemetry backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryBackend {
    /// `nvidia-smi` query interface
    Smi,
    /// Scriptable mock backend for testing
    Mock,
}

/// Sampler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Backend to read from
    pub backend: TelemetryBackend,

    /// Device index to monitor
    pub gpu_index: u32,

    /// Timeout for a single device read
    pub sample_timeout: Duration,

    /// Extra attempts allowed after a failed read within one call
    pub max_retries: u32,

    /// Pause between attempts
    pub retry_backoff: Duration,

    /// Path or name of the `nvidia-smi` binary
    pub smi_binary: PathBuf,
}

impl SamplerConfig {
    /// Create a new sampler configuration
    pub fn new(backend: TelemetryBackend) -> Self {
        Self {
            backend,
            gpu_index: 0,
            sample_timeout: Duration::from_secs(2),
            max_retries: 2,
            retry_backoff: Duration::from_millis(50),
            smi_binary: PathBuf::from("nvidia-smi"),
        }
    }

    /// Derive sampler settings from the governor configuration
    pub fn from_governor(config: &GovernorConfig, backend: TelemetryBackend) -> Self {
        Self::new(backend)
            .with_sample_timeout(config.sample_timeout())
            .with_max_retries(config.max_retries_per_cycle)
    }

    /// Set the device index
    pub fn with_gpu_index(mut self, index: u32) -> Self {
        self.gpu_index = index;
        self
    }

    /// Set the per-read timeout
    pub fn with_sample_timeout(mut self, timeout: Duration) -> Self {
        self.sample_timeout = timeout;
        self
    }

    /// Set the number of retries
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the pause between attempts
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set the `nvidia-smi` binary
    pub fn with_smi_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.smi_binary = binary.into();
        self
    }

    /// Total attempts per call
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_timeout.is_zero() {
            return Err("Sample timeout must be greater than zero".to_string());
        }

        // retrying is bounded so a dead device cannot stall the cycle
        if self.max_retries > 10 {
            return Err("Max retries must not exceed 10".to_string());
        }

        if self.backend == TelemetryBackend::Smi && self.smi_binary.as_os_str().is_empty() {
            return Err("nvidia-smi binary path must not be empty".to_string());
        }

        Ok(())
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::new(TelemetryBackend::Smi)
    }
}

impl std::fmt::Display for TelemetryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TelemetryBackend::Smi => write!(f, "smi"),
            TelemetryBackend::Mock => write!(f, "mock"),
        }
    }
}

impl std::str::FromStr for TelemetryBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "smi" | "nvidia-smi" | "nvml" => Ok(TelemetryBackend::Smi),
            "mock" => Ok(TelemetryBackend::Mock),
            _ => Err(format!("Unknown telemetry backend: {}", s)),
        }
    }
}
