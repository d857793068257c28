//! Bounded telemetry and decision history

use crate::decision::{Confidence, Decision, DecisionReason};
use fpgov_core::{ComplexityScore, PrecisionTier, TelemetrySample, TelemetrySummary};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What prompted an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Synchronous `submit`
    Submission,
    /// Score queued with `enqueue`, drained by the controller
    Queued,
    /// Periodic re-evaluation of the last score
    Reevaluation,
}

/// Result of handing a decision to the applier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// The tier stayed the same
    Unchanged,
    /// The requested tier is now in effect
    Applied,
    /// The runtime rejected the tier and Wide is in effect
    Fallback { error: String },
}

/// One evaluation of the decision engine, kept for inspection and export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub timestamp: DateTime<Utc>,
    pub trigger: Trigger,
    pub score: ComplexityScore,
    pub from_tier: PrecisionTier,
    pub requested_tier: PrecisionTier,
    /// Tier in effect after the decision was applied
    pub effective_tier: PrecisionTier,
    pub confidence: Confidence,
    pub reason: DecisionReason,
    pub outcome: ApplyOutcome,
    pub telemetry: Option<TelemetrySummary>,
}

impl DecisionRecord {
    pub fn new(
        decision: &Decision,
        trigger: Trigger,
        effective_tier: PrecisionTier,
        outcome: ApplyOutcome,
        telemetry: Option<TelemetrySummary>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            trigger,
            score: decision.score,
            from_tier: decision.previous,
            requested_tier: decision.tier,
            effective_tier,
            confidence: decision.confidence,
            reason: decision.reason.clone(),
            outcome,
            telemetry,
        }
    }

    /// Whether the effective tier changed
    pub fn is_transition(&self) -> bool {
        self.from_tier != self.effective_tier
    }
}

/// Ring buffers of recent samples and decision records
#[derive(Debug)]
pub struct History {
    samples: VecDeque<TelemetrySample>,
    decisions: VecDeque<DecisionRecord>,
    capacity: usize,
    summary_window: usize,
    samples_seen: u64,
}

impl History {
    pub fn new(capacity: usize, summary_window: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            decisions: VecDeque::with_capacity(capacity),
            capacity,
            summary_window: summary_window.clamp(1, capacity),
            samples_seen: 0,
        }
    }

    pub fn push_sample(&mut self, sample: TelemetrySample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.samples_seen += 1;
    }

    pub fn push_decision(&mut self, record: DecisionRecord) {
        if self.decisions.len() == self.capacity {
            self.decisions.pop_front();
        }
        self.decisions.push_back(record);
    }

    /// Rolling summary over the most recent samples
    pub fn summary(&self) -> Option<TelemetrySummary> {
        let start = self.samples.len().saturating_sub(self.summary_window);
        let window: Vec<TelemetrySample> = self.samples.range(start..).cloned().collect();
        TelemetrySummary::from_samples(&window)
    }

    pub fn samples(&self) -> impl Iterator<Item = &TelemetrySample> {
        self.samples.iter()
    }

    pub fn decisions(&self) -> impl Iterator<Item = &DecisionRecord> {
        self.decisions.iter()
    }

    pub fn latest_sample(&self) -> Option<&TelemetrySample> {
        self.samples.back()
    }

    /// Samples recorded since start, including evicted ones
    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }

    pub fn decision_count(&self) -> usize {
        self.decisions.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tier: PrecisionTier) -> DecisionRecord {
        let decision = Decision {
            score: ComplexityScore::new(0.1),
            previous: PrecisionTier::Wide,
            tier,
            confidence: Confidence::Reduced,
            reason: DecisionReason::BelowLowThreshold,
        };
        DecisionRecord::new(&decision, Trigger::Submission, tier, ApplyOutcome::Applied, None)
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let mut history = History::new(3, 2);
        for i in 0..5 {
            history.push_sample(TelemetrySample::new(i as f64 * 10.0, 100.0, 1000, 0));
        }

        let utilization: Vec<f64> = history.samples().map(|s| s.utilization_pct).collect();
        assert_eq!(utilization, vec![20.0, 30.0, 40.0]);
        assert_eq!(history.samples_seen(), 5);
        assert_eq!(history.latest_sample().unwrap().utilization_pct, 40.0);
    }

    #[test]
    fn test_summary_uses_recent_window() {
        let mut history = History::new(10, 2);
        assert!(history.summary().is_none());

        history.push_sample(TelemetrySample::new(10.0, 100.0, 1000, 0));
        history.push_sample(TelemetrySample::new(60.0, 200.0, 1000, 0));
        history.push_sample(TelemetrySample::new(80.0, 300.0, 1000, 0));

        let summary = history.summary().unwrap();
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.avg_utilization_pct, 70.0);
        assert_eq!(summary.avg_power_watts, 250.0);
    }

    #[test]
    fn test_decision_records_bounded() {
        let mut history = History::new(2, 1);
        history.push_decision(record(PrecisionTier::Narrow));
        history.push_decision(record(PrecisionTier::Wide));
        history.push_decision(record(PrecisionTier::Narrow));

        assert_eq!(history.decision_count(), 2);
        let tiers: Vec<PrecisionTier> = history.decisions().map(|r| r.effective_tier).collect();
        assert_eq!(tiers, vec![PrecisionTier::Wide, PrecisionTier::Narrow]);
    }

    #[test]
    fn test_record_serializes_reason_and_outcome() {
        let mut record = record(PrecisionTier::Wide);
        record.outcome = ApplyOutcome::Fallback {
            error: "unsupported".to_string(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["reason"]["kind"], "below_low_threshold");
        assert_eq!(json["outcome"]["status"], "fallback");
        assert_eq!(json["trigger"], "submission");
        assert_eq!(json["confidence"], "reduced");
        assert!(!record.is_transition());
    }
}
