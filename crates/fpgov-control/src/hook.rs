//! Apply hook for hosts without a framework integration

use fpgov_core::{ApplyError, ApplyHook, OptimizationProfile};

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Accepts every profile and logs it. Used when the governor only observes,
/// e.g. while collecting telemetry.
#[derive(Debug, Default)]
pub struct LoggingApplyHook {
    applied: AtomicU64,
}

impl LoggingApplyHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Profiles accepted so far
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApplyHook for LoggingApplyHook {
    async fn apply(&self, profile: &OptimizationProfile) -> Result<(), ApplyError> {
        self.applied.fetch_add(1, Ordering::SeqCst);
        info!("Runtime precision set to {}", profile);
        Ok(())
    }
}
