//! Precision decision engine
//!
//! A small state machine over precision tiers. Scores strictly below the low
//! threshold move the governor to the efficient tier, scores strictly above the
//! high threshold move it back to Wide, and anything in between holds. At most
//! one transition happens per cooldown window.

use fpgov_core::{ApplyError, ComplexityScore, GovernorConfig, PrecisionTier, TelemetrySummary};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How much information backed a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Score plus a telemetry summary
    Full,
    /// Score only; telemetry was unavailable or disabled
    Reduced,
}

/// Why the engine chose the tier it did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionReason {
    BelowLowThreshold,
    AboveHighThreshold,
    WithinHysteresisBand,
    CooldownActive { remaining_ms: u64 },
    TierPinned { tier: PrecisionTier },
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecisionReason::BelowLowThreshold => write!(f, "score below low threshold"),
            DecisionReason::AboveHighThreshold => write!(f, "score above high threshold"),
            DecisionReason::WithinHysteresisBand => write!(f, "score within hysteresis band"),
            DecisionReason::CooldownActive { remaining_ms } => {
                write!(f, "cooldown active ({}ms remaining)", remaining_ms)
            }
            DecisionReason::TierPinned { tier } => {
                write!(f, "{} pinned unsupported until capability recheck", tier)
            }
        }
    }
}

/// Outcome of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub score: ComplexityScore,
    /// Tier in effect when the evaluation started
    pub previous: PrecisionTier,
    /// Tier the engine wants in effect
    pub tier: PrecisionTier,
    pub confidence: Confidence,
    pub reason: DecisionReason,
}

impl Decision {
    /// Whether the decision asks for a tier change
    pub fn is_transition(&self) -> bool {
        self.tier != self.previous
    }
}

#[derive(Debug, Clone, Copy)]
struct Pin {
    tier: PrecisionTier,
    since: Instant,
}

/// Tier selection state machine
#[derive(Debug)]
pub struct DecisionEngine {
    low_threshold: f64,
    high_threshold: f64,
    cooldown: Duration,
    efficient_tier: PrecisionTier,
    current: PrecisionTier,
    last_transition: Option<Instant>,
    pinned: Option<Pin>,
    transitions: u64,
}

impl DecisionEngine {
    /// Create an engine starting in the configured default tier
    pub fn new(config: &GovernorConfig) -> Self {
        Self {
            low_threshold: config.low_threshold,
            high_threshold: config.high_threshold,
            cooldown: config.cooldown(),
            efficient_tier: config.efficient_tier,
            current: config.default_tier,
            last_transition: None,
            pinned: None,
            transitions: 0,
        }
    }

    /// Decide which tier a score calls for. Does not change the current tier;
    /// call [`commit`](Self::commit) once the tier has been applied.
    pub fn evaluate(
        &self,
        score: ComplexityScore,
        summary: Option<&TelemetrySummary>,
        now: Instant,
    ) -> Decision {
        let confidence = match summary {
            Some(_) => Confidence::Full,
            None => Confidence::Reduced,
        };

        let value = score.value();
        let (target, reason) = if value < self.low_threshold {
            (self.efficient_tier, DecisionReason::BelowLowThreshold)
        } else if value > self.high_threshold {
            (PrecisionTier::Wide, DecisionReason::AboveHighThreshold)
        } else {
            (self.current, DecisionReason::WithinHysteresisBand)
        };

        let (tier, reason) = if target == self.current {
            (self.current, reason)
        } else if self.is_pinned(target) {
            (self.current, DecisionReason::TierPinned { tier: target })
        } else if let Some(remaining) = self.cooldown_remaining(now) {
            (
                self.current,
                DecisionReason::CooldownActive {
                    remaining_ms: remaining.as_millis() as u64,
                },
            )
        } else {
            (target, reason)
        };

        let decision = Decision {
            score,
            previous: self.current,
            tier,
            confidence,
            reason,
        };

        if confidence == Confidence::Reduced {
            info!(
                "Reduced-confidence decision without telemetry: score {} -> {} ({}), tier in effect {}",
                score, decision.tier, decision.reason, self.current
            );
        } else {
            debug!("Decision: score {} -> {} ({})", score, decision.tier, decision.reason);
        }

        decision
    }

    /// Record that `tier` is now in effect
    pub fn commit(&mut self, tier: PrecisionTier, now: Instant) {
        if tier == self.current {
            return;
        }

        info!("Precision tier transition: {} -> {}", self.current, tier);
        self.current = tier;
        self.last_transition = Some(now);
        self.transitions += 1;
    }

    /// Force Wide after the runtime failed to apply `requested`.
    ///
    /// An unsupported tier is pinned so the engine stops asking for it until
    /// the capability is rechecked. The fallback is not a transition and does
    /// not restart the cooldown.
    pub fn fallback(&mut self, requested: PrecisionTier, error: &ApplyError, now: Instant) {
        if matches!(error, ApplyError::Unsupported(_)) && !requested.is_wide() {
            warn!(
                "Pinning {} after unsupported apply; tier in effect is {}",
                requested,
                PrecisionTier::Wide
            );
            self.pinned = Some(Pin {
                tier: requested,
                since: now,
            });
        } else {
            warn!("Apply of {} failed ({}); falling back to {}", requested, error, PrecisionTier::Wide);
        }
        self.current = PrecisionTier::Wide;
    }

    /// Whether `tier` is pinned as unsupported
    pub fn is_pinned(&self, tier: PrecisionTier) -> bool {
        self.pinned.map_or(false, |pin| pin.tier == tier)
    }

    /// Pinned tier, if any
    pub fn pinned(&self) -> Option<PrecisionTier> {
        self.pinned.map(|pin| pin.tier)
    }

    /// Whether the pin is older than `recheck_after`
    pub fn pin_due_for_recheck(&self, now: Instant, recheck_after: Duration) -> bool {
        self.pinned
            .map_or(false, |pin| now.saturating_duration_since(pin.since) >= recheck_after)
    }

    /// Restart the recheck timer of a pin that is still unsupported
    pub fn renew_pin(&mut self, now: Instant) {
        if let Some(pin) = self.pinned.as_mut() {
            pin.since = now;
        }
    }

    /// Clear the pin. Returns the tier that was pinned.
    pub fn clear_pin(&mut self) -> Option<PrecisionTier> {
        let cleared = self.pinned.take().map(|pin| pin.tier);
        if let Some(tier) = cleared {
            info!("Cleared capability pin on {}", tier);
        }
        cleared
    }

    pub fn current_tier(&self) -> PrecisionTier {
        self.current
    }

    /// Number of committed transitions
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        let last = self.last_transition?;
        let elapsed = now.saturating_duration_since(last);
        if elapsed < self.cooldown {
            Some(self.cooldown - elapsed)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpgov_core::TelemetrySample;

    fn engine(cooldown_ms: u64) -> DecisionEngine {
        DecisionEngine::new(&GovernorConfig::default().with_cooldown(Duration::from_millis(cooldown_ms)))
    }

    fn score(value: f64) -> ComplexityScore {
        ComplexityScore::new(value)
    }

    /// Evaluate and commit, as the governor does after a successful apply
    fn step(engine: &mut DecisionEngine, value: f64, now: Instant) -> Decision {
        let decision = engine.evaluate(score(value), None, now);
        engine.commit(decision.tier, now);
        decision
    }

    #[test]
    fn test_initial_tier_is_default() {
        assert_eq!(engine(0).current_tier(), PrecisionTier::Wide);

        let config = GovernorConfig::default().with_default_tier(PrecisionTier::Narrow);
        assert_eq!(DecisionEngine::new(&config).current_tier(), PrecisionTier::Narrow);
    }

    #[test]
    fn test_threshold_transitions() {
        let mut engine = engine(0);
        let now = Instant::now();

        let decision = step(&mut engine, 0.1, now);
        assert_eq!(decision.tier, PrecisionTier::Narrow);
        assert_eq!(decision.reason, DecisionReason::BelowLowThreshold);
        assert!(decision.is_transition());

        let decision = step(&mut engine, 0.5, now);
        assert_eq!(decision.tier, PrecisionTier::Narrow);
        assert_eq!(decision.reason, DecisionReason::WithinHysteresisBand);

        let decision = step(&mut engine, 0.9, now);
        assert_eq!(decision.tier, PrecisionTier::Wide);
        assert_eq!(engine.transitions(), 2);
    }

    #[test]
    fn test_evaluate_does_not_change_tier() {
        let engine = engine(0);
        let decision = engine.evaluate(score(0.0), None, Instant::now());
        assert_eq!(decision.tier, PrecisionTier::Narrow);
        assert_eq!(engine.current_tier(), PrecisionTier::Wide);
    }

    #[test]
    fn test_first_transition_ignores_cooldown() {
        let mut engine = engine(60_000);
        let decision = step(&mut engine, 0.1, Instant::now());
        assert_eq!(decision.tier, PrecisionTier::Narrow);
    }

    #[test]
    fn test_cooldown_blocks_both_directions() {
        let mut engine = engine(5_000);
        let start = Instant::now();

        step(&mut engine, 0.1, start);

        let decision = step(&mut engine, 0.95, start + Duration::from_millis(1_000));
        assert_eq!(decision.tier, PrecisionTier::Narrow);
        assert_eq!(
            decision.reason,
            DecisionReason::CooldownActive { remaining_ms: 4_000 }
        );

        let decision = step(&mut engine, 0.95, start + Duration::from_millis(5_000));
        assert_eq!(decision.tier, PrecisionTier::Wide);

        let decision = step(&mut engine, 0.05, start + Duration::from_millis(9_999));
        assert_eq!(decision.tier, PrecisionTier::Wide);
        assert!(matches!(decision.reason, DecisionReason::CooldownActive { .. }));
    }

    #[test]
    fn test_transitions_never_closer_than_cooldown() {
        let cooldown = Duration::from_millis(2_000);
        let mut engine = engine(2_000);
        let start = Instant::now();
        let mut last_transition: Option<Instant> = None;

        for i in 0..400u64 {
            let now = start + Duration::from_millis(i * 50);
            let value = if (i / 3) % 2 == 0 { 0.05 } else { 0.95 };
            if step(&mut engine, value, now).is_transition() {
                if let Some(last) = last_transition {
                    assert!(now - last >= cooldown);
                }
                last_transition = Some(now);
            }
        }
        assert!(engine.transitions() > 1);
    }

    #[test]
    fn test_score_at_threshold_never_flaps() {
        let config = GovernorConfig::default();
        for value in [config.low_threshold, config.high_threshold] {
            let mut engine = engine(0);
            let start = Instant::now();
            for i in 0..100u64 {
                step(&mut engine, value, start + Duration::from_secs(i));
            }
            assert_eq!(engine.transitions(), 0, "flapped at {}", value);
        }
    }

    #[test]
    fn test_confidence_depends_on_telemetry() {
        let engine = engine(0);
        let samples = vec![TelemetrySample::new(50.0, 150.0, 1500, 1024)];
        let summary = TelemetrySummary::from_samples(&samples).unwrap();

        let now = Instant::now();
        assert_eq!(engine.evaluate(score(0.5), Some(&summary), now).confidence, Confidence::Full);
        assert_eq!(engine.evaluate(score(0.5), None, now).confidence, Confidence::Reduced);
    }

    #[test]
    fn test_unsupported_fallback_pins_tier() {
        let mut engine = engine(0);
        let now = Instant::now();

        let decision = engine.evaluate(score(0.1), None, now);
        engine.fallback(decision.tier, &ApplyError::Unsupported(decision.tier), now);

        assert_eq!(engine.current_tier(), PrecisionTier::Wide);
        assert!(engine.is_pinned(PrecisionTier::Narrow));
        assert_eq!(engine.transitions(), 0);

        let decision = engine.evaluate(score(0.1), None, now);
        assert_eq!(decision.tier, PrecisionTier::Wide);
        assert_eq!(
            decision.reason,
            DecisionReason::TierPinned { tier: PrecisionTier::Narrow }
        );

        assert_eq!(engine.clear_pin(), Some(PrecisionTier::Narrow));
        assert_eq!(engine.evaluate(score(0.1), None, now).tier, PrecisionTier::Narrow);
    }

    #[test]
    fn test_failed_apply_falls_back_without_pin() {
        let mut engine = engine(0);
        let now = Instant::now();
        step(&mut engine, 0.1, now);

        engine.fallback(
            PrecisionTier::Wide,
            &ApplyError::Failed("driver reset".to_string()),
            now,
        );
        assert_eq!(engine.current_tier(), PrecisionTier::Wide);
        assert_eq!(engine.pinned(), None);
    }

    #[test]
    fn test_pin_recheck_timing() {
        let mut engine = engine(0);
        let start = Instant::now();
        engine.fallback(
            PrecisionTier::Narrow,
            &ApplyError::Unsupported(PrecisionTier::Narrow),
            start,
        );

        let recheck = Duration::from_secs(60);
        assert!(!engine.pin_due_for_recheck(start + Duration::from_secs(59), recheck));
        assert!(engine.pin_due_for_recheck(start + Duration::from_secs(60), recheck));

        engine.renew_pin(start + Duration::from_secs(60));
        assert!(!engine.pin_due_for_recheck(start + Duration::from_secs(61), recheck));
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(
            DecisionReason::CooldownActive { remaining_ms: 250 }.to_string(),
            "cooldown active (250ms remaining)"
        );
        assert_eq!(
            DecisionReason::TierPinned { tier: PrecisionTier::Narrow }.to_string(),
            "Narrow pinned unsupported until capability recheck"
        );
    }
}
