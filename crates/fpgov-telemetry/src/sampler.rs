//! Bounded-retry telemetry sampling

use crate::config::{SamplerConfig, TelemetryBackend};
use fpgov_core::{Error, Result, TelemetryError, TelemetrySample, TelemetrySource};

use tracing::{debug, info, warn};

/// Sampler that wraps a backend-specific source with timeouts and retries
pub struct TelemetrySampler {
    source: Box<dyn TelemetrySource>,
    config: SamplerConfig,
}

impl TelemetrySampler {
    /// Create a sampler for the configured backend
    pub fn new(config: SamplerConfig) -> Result<Self> {
        info!(
            "Creating telemetry sampler for backend {} (gpu {})",
            config.backend, config.gpu_index
        );

        config.validate().map_err(Error::config)?;
        let source = create_source(&config)?;

        Ok(Self { source, config })
    }

    /// Create a sampler around an existing source
    pub fn from_source(source: impl TelemetrySource + 'static, config: SamplerConfig) -> Self {
        Self {
            source: Box::new(source),
            config,
        }
    }

    /// Read one sample, retrying failed or timed-out reads up to the
    /// configured bound. Returns the last error when every attempt fails.
    pub async fn sample_with_retry(&self) -> std::result::Result<TelemetrySample, TelemetryError> {
        let attempts = self.config.attempts();
        let mut last_error = TelemetryError::Unavailable("no attempts made".to_string());

        for attempt in 1..=attempts {
            match tokio::time::timeout(self.config.sample_timeout, self.source.sample()).await {
                Ok(Ok(sample)) => {
                    debug!(
                        "Sampled {} on attempt {}: {:.1}% {:.1}W",
                        self.source.name(),
                        attempt,
                        sample.utilization_pct,
                        sample.power_watts
                    );
                    return Ok(sample);
                }
                Ok(Err(e)) => {
                    warn!("Telemetry read {}/{} failed: {}", attempt, attempts, e);
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        "Telemetry read {}/{} timed out after {:?}",
                        attempt, attempts, self.config.sample_timeout
                    );
                    last_error = TelemetryError::Timeout(self.config.sample_timeout);
                }
            }

            if attempt < attempts && !self.config.retry_backoff.is_zero() {
                tokio::time::sleep(self.config.retry_backoff).await;
            }
        }

        Err(last_error)
    }

    /// Release the underlying device handle. Errors are logged, not returned.
    pub async fn shutdown(&self) {
        info!("Shutting down telemetry sampler");
        if let Err(e) = self.source.shutdown().await {
            warn!("Telemetry source shutdown failed: {}", e);
        }
    }

    /// Name of the underlying source
    pub fn name(&self) -> &str {
        self.source.name()
    }

    /// Get configuration
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }
}

/// Create a backend-specific telemetry source
fn create_source(config: &SamplerConfig) -> Result<Box<dyn TelemetrySource>> {
    match config.backend {
        #[cfg(feature = "smi")]
        TelemetryBackend::Smi => Ok(Box::new(crate::smi::SmiTelemetrySource::new(
            config.smi_binary.clone(),
            config.gpu_index,
        ))),

        #[cfg(any(feature = "mock", test))]
        TelemetryBackend::Mock => Ok(Box::new(crate::mock::MockTelemetrySource::default())),

        #[allow(unreachable_patterns)]
        _ => {
            warn!("Telemetry backend {} not supported or feature not enabled", config.backend);
            Err(Error::config(format!(
                "telemetry backend '{}' is not enabled in this build",
                config.backend
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBehavior, MockTelemetrySource};
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_config(retries: u32) -> SamplerConfig {
        SamplerConfig::new(TelemetryBackend::Mock)
            .with_max_retries(retries)
            .with_sample_timeout(Duration::from_millis(50))
            .with_retry_backoff(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_sampler_creation_with_mock_backend() {
        let sampler = TelemetrySampler::new(fast_config(1)).unwrap();
        assert_eq!(sampler.name(), "mock");
        assert!(sampler.sample_with_retry().await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = fast_config(1).with_sample_timeout(Duration::ZERO);
        assert!(TelemetrySampler::new(config).is_err());
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let mock = Arc::new(MockTelemetrySource::steady(60.0, 180.0));
        mock.push(Err(TelemetryError::Unavailable("busy".to_string()))).await;

        let sampler = TelemetrySampler::from_source(mock.clone(), fast_config(2));
        let sample = sampler.sample_with_retry().await.unwrap();

        assert_eq!(sample.utilization_pct, 60.0);
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let mock = Arc::new(MockTelemetrySource::unavailable("driver not loaded"));
        let sampler = TelemetrySampler::from_source(mock.clone(), fast_config(2));

        let err = sampler.sample_with_retry().await.unwrap_err();
        assert!(matches!(err, TelemetryError::Unavailable(_)));
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn test_hung_read_times_out() {
        let mock = Arc::new(MockTelemetrySource::new(MockBehavior::Hang));
        let sampler = TelemetrySampler::from_source(mock.clone(), fast_config(0));

        let err = sampler.sample_with_retry().await.unwrap_err();
        assert_eq!(err, TelemetryError::Timeout(Duration::from_millis(50)));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_reaches_source() {
        let mock = Arc::new(MockTelemetrySource::default());
        let sampler = TelemetrySampler::from_source(mock.clone(), fast_config(0));
        sampler.shutdown().await;
        assert!(mock.is_shut_down());
    }
}
