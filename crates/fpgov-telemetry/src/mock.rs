//! Mock telemetry source for testing

use fpgov_core::{TelemetryError, TelemetrySample, TelemetrySource};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// What the mock returns once its script is exhausted
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Return this reading, restamped on every call
    Steady(TelemetrySample),
    /// Fail every read
    Unavailable(String),
    /// Never complete the read
    Hang,
}

/// Mock telemetry source with scripted results
pub struct MockTelemetrySource {
    script: Arc<RwLock<VecDeque<Result<TelemetrySample, TelemetryError>>>>,
    behavior: Arc<RwLock<MockBehavior>>,
    calls: AtomicUsize,
    shut_down: AtomicBool,
}

impl MockTelemetrySource {
    /// Create a mock with the given fallback behavior
    pub fn new(behavior: MockBehavior) -> Self {
        info!("Creating mock telemetry source");
        Self {
            script: Arc::new(RwLock::new(VecDeque::new())),
            behavior: Arc::new(RwLock::new(behavior)),
            calls: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Mock reporting a constant utilization and power draw
    pub fn steady(utilization_pct: f64, power_watts: f64) -> Self {
        Self::new(MockBehavior::Steady(TelemetrySample::new(
            utilization_pct,
            power_watts,
            1410,
            8192,
        )))
    }

    /// Mock whose device can never be read
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::new(MockBehavior::Unavailable(reason.into()))
    }

    /// Queue a result returned ahead of the fallback behavior
    pub async fn push(&self, result: Result<TelemetrySample, TelemetryError>) {
        self.script.write().await.push_back(result);
    }

    /// Replace the fallback behavior
    pub async fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.write().await = behavior;
    }

    /// Number of reads attempted so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Whether `shutdown` has been called
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Default for MockTelemetrySource {
    fn default() -> Self {
        Self::steady(50.0, 150.0)
    }
}

#[async_trait]
impl TelemetrySource for MockTelemetrySource {
    async fn sample(&self) -> Result<TelemetrySample, TelemetryError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(scripted) = self.script.write().await.pop_front() {
            debug!("Mock telemetry call {} served from script", call);
            return scripted.map(|sample| sample.with_timestamp(Utc::now()));
        }

        let behavior = self.behavior.read().await.clone();
        match behavior {
            MockBehavior::Steady(template) => Ok(template.with_timestamp(Utc::now())),
            MockBehavior::Unavailable(reason) => Err(TelemetryError::Unavailable(reason)),
            MockBehavior::Hang => {
                debug!("Mock telemetry call {} hanging", call);
                std::future::pending().await
            }
        }
    }

    async fn shutdown(&self) -> Result<(), TelemetryError> {
        info!("Shutting down mock telemetry source");
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_steady_mock_restamps_samples() {
        let mock = MockTelemetrySource::steady(80.0, 200.0);

        let first = mock.sample().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = mock.sample().await.unwrap();

        assert_eq!(first.utilization_pct, 80.0);
        assert_eq!(second.power_watts, 200.0);
        assert!(second.timestamp > first.timestamp);
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_script_takes_precedence() {
        let mock = MockTelemetrySource::steady(10.0, 50.0);
        mock.push(Err(TelemetryError::Malformed("garbled".to_string()))).await;

        assert!(matches!(mock.sample().await, Err(TelemetryError::Malformed(_))));
        assert_eq!(mock.sample().await.unwrap().utilization_pct, 10.0);
    }

    #[tokio::test]
    async fn test_unavailable_and_behavior_change() {
        let mock = MockTelemetrySource::unavailable("no device");
        assert!(matches!(mock.sample().await, Err(TelemetryError::Unavailable(_))));

        mock.set_behavior(MockBehavior::Steady(TelemetrySample::new(5.0, 30.0, 900, 10)))
            .await;
        assert_eq!(mock.sample().await.unwrap().power_watts, 30.0);
    }

    #[tokio::test]
    async fn test_hang_never_completes() {
        let mock = MockTelemetrySource::new(MockBehavior::Hang);
        let result = tokio::time::timeout(Duration::from_millis(20), mock.sample()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_flag() {
        let mock = MockTelemetrySource::default();
        assert!(!mock.is_shut_down());
        mock.shutdown().await.unwrap();
        assert!(mock.is_shut_down());
        assert_eq!(mock.name(), "mock");
    }
}
