//! Core traits for fpgov components
//!
//! These traits define the seams between the governor and the outside world:
//! the device telemetry source, the framework's precision apply hook, and the
//! submission gate that framework adapters call.

use crate::error::{ApplyError, TelemetryError};
use crate::{OptimizationProfile, PrecisionTier, Result, TelemetrySample, WorkloadDescriptor};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Source of device telemetry readings
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Read the device counters once. May block on device I/O.
    async fn sample(&self) -> std::result::Result<TelemetrySample, TelemetryError>;

    /// Release any device handle held by the source
    async fn shutdown(&self) -> std::result::Result<(), TelemetryError> {
        Ok(())
    }

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// Hook supplied by the hosting framework integration to change the runtime's
/// active precision configuration
#[async_trait]
pub trait ApplyHook: Send + Sync {
    /// Switch the runtime to the given profile
    async fn apply(&self, profile: &OptimizationProfile) -> std::result::Result<(), ApplyError>;

    /// Report whether the runtime can currently honor a tier. Used when a
    /// pinned tier is rechecked.
    async fn probe(&self, _tier: PrecisionTier) -> std::result::Result<(), ApplyError> {
        Ok(())
    }
}

/// Entry point for framework adapters submitting workloads
#[async_trait]
pub trait WorkloadGate: Send + Sync {
    /// Score and decide for a workload, returning the tier in effect
    async fn submit(&self, descriptor: &WorkloadDescriptor) -> Result<PrecisionTier>;

    /// Tier currently in effect. Never waits on telemetry.
    fn current_tier(&self) -> PrecisionTier;
}

#[async_trait]
impl<T: ApplyHook + ?Sized> ApplyHook for Arc<T> {
    async fn apply(&self, profile: &OptimizationProfile) -> std::result::Result<(), ApplyError> {
        (**self).apply(profile).await
    }

    async fn probe(&self, tier: PrecisionTier) -> std::result::Result<(), ApplyError> {
        (**self).probe(tier).await
    }
}

#[async_trait]
impl<T: TelemetrySource + ?Sized> TelemetrySource for Arc<T> {
    async fn sample(&self) -> std::result::Result<TelemetrySample, TelemetryError> {
        (**self).sample().await
    }

    async fn shutdown(&self) -> std::result::Result<(), TelemetryError> {
        (**self).shutdown().await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Mock implementations for testing and development

/// Mock apply hook that records every profile it receives
pub struct MockApplyHook {
    applied: Arc<RwLock<Vec<OptimizationProfile>>>,
    unsupported: Arc<RwLock<HashSet<PrecisionTier>>>,
}

impl MockApplyHook {
    pub fn new() -> Self {
        Self {
            applied: Arc::new(RwLock::new(Vec::new())),
            unsupported: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Mock whose runtime rejects the given tiers
    pub fn rejecting(tiers: impl IntoIterator<Item = PrecisionTier>) -> Self {
        Self {
            applied: Arc::new(RwLock::new(Vec::new())),
            unsupported: Arc::new(RwLock::new(tiers.into_iter().collect())),
        }
    }

    /// Change whether a tier is supported
    pub async fn set_supported(&self, tier: PrecisionTier, supported: bool) {
        let mut unsupported = self.unsupported.write().await;
        if supported {
            unsupported.remove(&tier);
        } else {
            unsupported.insert(tier);
        }
    }

    /// Profiles successfully applied so far, in order
    pub async fn applied(&self) -> Vec<OptimizationProfile> {
        self.applied.read().await.clone()
    }
}

impl Default for MockApplyHook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApplyHook for MockApplyHook {
    async fn apply(&self, profile: &OptimizationProfile) -> std::result::Result<(), ApplyError> {
        self.probe(profile.tier()).await?;
        self.applied.write().await.push(*profile);
        Ok(())
    }

    async fn probe(&self, tier: PrecisionTier) -> std::result::Result<(), ApplyError> {
        if self.unsupported.read().await.contains(&tier) {
            return Err(ApplyError::Unsupported(tier));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_apply_hook_records_profiles() {
        let hook = MockApplyHook::new();
        let narrow = OptimizationProfile::for_tier(PrecisionTier::Narrow);

        hook.apply(&narrow).await.unwrap();
        hook.apply(&OptimizationProfile::for_tier(PrecisionTier::Wide)).await.unwrap();

        let applied = hook.applied().await;
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0], narrow);
        assert_eq!(applied[1].tier(), PrecisionTier::Wide);
    }

    #[tokio::test]
    async fn test_mock_apply_hook_rejects_unsupported_tier() {
        let hook = MockApplyHook::rejecting([PrecisionTier::Narrow]);
        let err = hook
            .apply(&OptimizationProfile::for_tier(PrecisionTier::Narrow))
            .await
            .unwrap_err();
        assert_eq!(err, ApplyError::Unsupported(PrecisionTier::Narrow));
        assert!(hook.applied().await.is_empty());

        hook.set_supported(PrecisionTier::Narrow, true).await;
        assert!(hook.probe(PrecisionTier::Narrow).await.is_ok());
    }

    #[tokio::test]
    async fn test_arc_hook_delegates() {
        let hook = Arc::new(MockApplyHook::new());
        let shared: Arc<dyn ApplyHook> = hook.clone();
        shared
            .apply(&OptimizationProfile::for_tier(PrecisionTier::Wide))
            .await
            .unwrap();
        assert_eq!(hook.applied().await.len(), 1);
    }
}
