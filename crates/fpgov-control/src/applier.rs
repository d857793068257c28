//! Optimization applier

use fpgov_core::{ApplyError, ApplyHook, OptimizationProfile, PrecisionTier};

use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Runtime configuration known to be in effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedState {
    pub profile: OptimizationProfile,
}

impl AppliedState {
    pub fn tier(&self) -> PrecisionTier {
        self.profile.tier()
    }
}

/// Pushes optimization profiles into the runtime through the framework hook.
///
/// Re-applying the profile already in effect does not call the hook. A failed
/// apply immediately re-applies the Wide profile so the runtime is never left
/// in the rejected configuration.
pub struct OptimizationApplier {
    hook: Arc<dyn ApplyHook>,
    current: Option<AppliedState>,
    hook_calls: u64,
}

impl OptimizationApplier {
    pub fn new(hook: Arc<dyn ApplyHook>) -> Self {
        Self {
            hook,
            current: None,
            hook_calls: 0,
        }
    }

    /// Apply `profile`, falling back to Wide on failure
    pub async fn apply(&mut self, profile: &OptimizationProfile) -> Result<AppliedState, ApplyError> {
        if let Some(state) = self.current.filter(|state| state.profile == *profile) {
            debug!("Profile for {} already applied", profile.tier());
            return Ok(state);
        }

        // Unknown until the hook returns, even if this future is dropped
        let previous = self.current.take();

        self.hook_calls += 1;
        match self.hook.apply(profile).await {
            Ok(()) => {
                info!("Applied optimization profile: {}", profile);
                let state = AppliedState { profile: *profile };
                self.current = Some(state);
                Ok(state)
            }
            Err(e) => {
                warn!("Failed to apply {} profile: {}", profile.tier(), e);
                self.restore_wide(profile.tier(), previous).await;
                Err(e)
            }
        }
    }

    /// Ask the runtime whether `tier` can be honored
    pub async fn probe(&self, tier: PrecisionTier) -> Result<(), ApplyError> {
        self.hook.probe(tier).await
    }

    /// State last applied successfully
    pub fn current(&self) -> Option<&AppliedState> {
        self.current.as_ref()
    }

    /// Number of times the hook was invoked
    pub fn hook_calls(&self) -> u64 {
        self.hook_calls
    }

    /// Whether the runtime is known to be in `tier`
    pub fn is_confirmed(&self, tier: PrecisionTier) -> bool {
        self.current.map_or(false, |state| state.tier() == tier)
    }

    async fn restore_wide(&mut self, failed: PrecisionTier, previous: Option<AppliedState>) {
        let wide = OptimizationProfile::for_tier(PrecisionTier::Wide);

        if failed.is_wide() {
            // the runtime just rejected Wide itself; its state is unknown
            error!("Runtime rejected the {} profile; precision state unknown", failed);
            self.current = None;
            return;
        }

        // A rejected apply leaves the runtime where it was
        if previous.map_or(false, |state| state.profile == wide) {
            self.current = previous;
            return;
        }

        self.hook_calls += 1;
        match self.hook.apply(&wide).await {
            Ok(()) => {
                info!("Restored {} profile after rejected {}", PrecisionTier::Wide, failed);
                self.current = Some(AppliedState { profile: wide });
            }
            Err(e) => {
                error!("Failed to restore {} profile: {}", PrecisionTier::Wide, e);
                self.current = None;
            }
        }
    }
}
