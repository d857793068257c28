//! Feedback controller
//!
//! Each cycle reads telemetry once (with the sampler's bounded retries) outside
//! the state lock, then takes the lock to record the sample, drain queued
//! scores, run the periodic re-evaluation, and recheck pinned tiers. Only the
//! read can be cancelled by shutdown.

use crate::governor::Shared;
use crate::history::{DecisionRecord, Trigger};
use fpgov_core::{TelemetryError, TelemetrySample};
use fpgov_telemetry::{TelemetryCsvWriter, TelemetrySampler};

use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Health of the telemetry feed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryStatus {
    /// Cleared after too many consecutive failed cycles; only
    /// `Governor::reset_telemetry` sets it again
    pub enabled: bool,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub last_error: Option<String>,
}

impl TelemetryStatus {
    pub(crate) fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Returns true when this failure disabled telemetry
    pub(crate) fn record_failure(&mut self, error: &TelemetryError, disable_after: u32) -> bool {
        self.consecutive_failures += 1;
        self.total_failures += 1;
        self.last_error = Some(error.to_string());

        if self.enabled && self.consecutive_failures >= disable_after {
            self.enabled = false;
            return true;
        }
        false
    }

    pub(crate) fn reset(&mut self) {
        self.enabled = true;
        self.consecutive_failures = 0;
    }
}

impl Default for TelemetryStatus {
    fn default() -> Self {
        Self {
            enabled: true,
            consecutive_failures: 0,
            total_failures: 0,
            last_error: None,
        }
    }
}

/// What one cycle did
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub sample: Option<TelemetrySample>,
    pub telemetry_enabled: bool,
    pub decisions: Vec<DecisionRecord>,
}

/// Drives the sampling and decision loop of a governor
pub struct FeedbackController {
    shared: Arc<Shared>,
    sampler: TelemetrySampler,
    csv: Option<TelemetryCsvWriter>,
}

impl FeedbackController {
    pub(crate) fn new(
        shared: Arc<Shared>,
        sampler: TelemetrySampler,
        csv: Option<TelemetryCsvWriter>,
    ) -> Self {
        Self {
            shared,
            sampler,
            csv,
        }
    }

    /// Run one sample and decision cycle
    pub async fn run_cycle(&mut self) -> CycleReport {
        let reading = self.read_telemetry().await;
        self.process(reading).await
    }

    /// Sample once, unless repeated failures have disabled telemetry
    async fn read_telemetry(&mut self) -> Option<Result<TelemetrySample, TelemetryError>> {
        let telemetry_enabled = self.shared.state.lock().await.telemetry.enabled;
        if !telemetry_enabled {
            return None;
        }
        Some(self.sampler.sample_with_retry().await)
    }

    /// Record the reading and run every decision it makes due
    async fn process(
        &mut self,
        reading: Option<Result<TelemetrySample, TelemetryError>>,
    ) -> CycleReport {
        let shared = Arc::clone(&self.shared);
        let config = &shared.config;
        let now = Instant::now();

        let mut state = shared.state.lock().await;
        let mut sample = None;

        match reading {
            Some(Ok(reading)) => {
                state.telemetry.record_success();

                let tier = state.engine.current_tier();
                state.energy.record_interval(&reading, tier);
                state.history.push_sample(reading.clone());

                if let Some(csv) = self.csv.as_mut() {
                    if let Err(e) = csv.append(&reading, tier) {
                        warn!("Failed to write telemetry row to {}: {}", csv.path().display(), e);
                    }
                }
                sample = Some(reading);
            }
            Some(Err(e)) => {
                if state.telemetry.record_failure(&e, config.disable_after_failures) {
                    warn!(
                        "Telemetry disabled after {} consecutive failed cycles ({}); deciding on score alone, tier in effect {}",
                        state.telemetry.consecutive_failures,
                        e,
                        state.engine.current_tier()
                    );
                } else {
                    debug!(
                        "Telemetry cycle failed ({}/{}): {}",
                        state.telemetry.consecutive_failures, config.disable_after_failures, e
                    );
                }
            }
            None => {}
        }

        state.recheck_pin(now, config.capability_recheck()).await;

        let mut decisions = Vec::new();
        let pending: Vec<_> = state.pending.drain(..).collect();
        for score in pending {
            let record = state
                .decide(score, Trigger::Queued, now, &shared.tier_tx)
                .await;
            decisions.push(record);
        }

        if decisions.is_empty() {
            let due = state
                .last_evaluation
                .map_or(true, |last| now.saturating_duration_since(last) >= config.reevaluate_interval());
            if let Some(score) = state.last_score.filter(|_| due) {
                let record = state
                    .decide(score, Trigger::Reevaluation, now, &shared.tier_tx)
                    .await;
                decisions.push(record);
            }
        }

        CycleReport {
            sample,
            telemetry_enabled: state.telemetry.enabled,
            decisions,
        }
    }

    /// Run cycles every `sample_interval` until `shutdown` fires, starting one
    /// interval from now. Shutdown abandons a pending telemetry read; once a
    /// reading is in, the cycle's decisions and applies run to completion.
    /// The telemetry source is always released.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.shared.config.sample_interval();
        info!("Feedback controller running every {:?} ({})", interval, self.sampler.name());

        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let reading = tokio::select! {
                        biased;
                        _ = shutdown.changed() => {
                            info!("Abandoning telemetry read for shutdown");
                            break;
                        }
                        reading = self.read_telemetry() => reading,
                    };
                    self.process(reading).await;
                }
            }
        }

        self.sampler.shutdown().await;
        self.shared.running.store(false, Ordering::SeqCst);
        info!("Feedback controller stopped");
    }
}

#[cfg(test)]
mod tests {
    use crate::governor::Governor;
    use crate::history::ApplyOutcome;
    use crate::decision::Confidence;
    use fpgov_core::traits::MockApplyHook;
    use fpgov_core::{
        GovernorConfig, OperationKind, PrecisionTier, TelemetryError, WorkloadDescriptor,
    };
    use fpgov_telemetry::mock::{MockBehavior, MockTelemetrySource};
    use fpgov_telemetry::{SamplerConfig, TelemetryBackend, TelemetryCsvWriter, TelemetrySampler};
    use std::sync::Arc;
    use std::time::Duration;

    fn config() -> GovernorConfig {
        GovernorConfig::default().with_sample_interval(Duration::from_millis(100))
    }

    fn sampler(source: Arc<MockTelemetrySource>, retries: u32) -> TelemetrySampler {
        let config = SamplerConfig::new(TelemetryBackend::Mock)
            .with_max_retries(retries)
            .with_sample_timeout(Duration::from_millis(50))
            .with_retry_backoff(Duration::ZERO);
        TelemetrySampler::from_source(source, config)
    }

    fn small_elementwise() -> WorkloadDescriptor {
        WorkloadDescriptor::of(OperationKind::Elementwise, 16, 1)
    }

    #[tokio::test]
    async fn test_cycle_records_sample_and_csv_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.csv");

        let governor = Governor::new(config(), Arc::new(MockApplyHook::new())).unwrap();
        let source = Arc::new(MockTelemetrySource::steady(30.0, 80.0));
        let csv = TelemetryCsvWriter::open(&path).unwrap();
        let mut controller = governor.controller(sampler(source, 0), Some(csv));

        assert_eq!(governor.submit(&small_elementwise()).await.unwrap(), PrecisionTier::Narrow);

        let report = controller.run_cycle().await;
        assert!(report.sample.is_some());
        assert!(report.telemetry_enabled);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with(",Narrow"));
    }

    #[tokio::test]
    async fn test_queued_scores_drained_by_cycle() {
        let governor = Governor::new(config(), Arc::new(MockApplyHook::new())).unwrap();
        let source = Arc::new(MockTelemetrySource::steady(50.0, 150.0));
        let mut controller = governor.controller(sampler(source, 0), None);

        governor.enqueue(&small_elementwise()).await.unwrap();
        assert_eq!(governor.current_tier(), PrecisionTier::Wide);
        assert_eq!(governor.status().await.pending_scores, 1);

        let report = controller.run_cycle().await;
        assert_eq!(report.decisions.len(), 1);
        assert_eq!(report.decisions[0].effective_tier, PrecisionTier::Narrow);
        assert_eq!(report.decisions[0].confidence, Confidence::Full);
        assert_eq!(governor.current_tier(), PrecisionTier::Narrow);
        assert_eq!(governor.status().await.pending_scores, 0);
    }

    #[tokio::test]
    async fn test_scenario_c_repeated_failures_disable_telemetry() {
        let governor = Governor::new(config(), Arc::new(MockApplyHook::new())).unwrap();
        let source = Arc::new(MockTelemetrySource::unavailable("no such device"));
        let mut controller = governor.controller(sampler(source.clone(), 0), None);

        for cycle in 1..=5 {
            let report = controller.run_cycle().await;
            assert!(report.sample.is_none());
            assert_eq!(report.telemetry_enabled, cycle < 5);
        }
        assert_eq!(source.calls(), 5);

        let status = governor.status().await;
        assert!(!status.telemetry.enabled);
        assert_eq!(status.telemetry.consecutive_failures, 5);
        assert!(status.telemetry.last_error.unwrap().contains("no such device"));

        // disabled: no more reads, decisions continue on score alone
        controller.run_cycle().await;
        assert_eq!(source.calls(), 5);

        assert_eq!(governor.submit(&small_elementwise()).await.unwrap(), PrecisionTier::Narrow);
        let decisions = governor.decisions().await;
        assert_eq!(decisions.last().unwrap().confidence, Confidence::Reduced);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let governor = Governor::new(config(), Arc::new(MockApplyHook::new())).unwrap();
        let source = Arc::new(MockTelemetrySource::steady(50.0, 150.0));
        for _ in 0..4 {
            source
                .push(Err(TelemetryError::Unavailable("busy".to_string())))
                .await;
        }
        let mut controller = governor.controller(sampler(source.clone(), 0), None);

        for _ in 0..5 {
            controller.run_cycle().await;
        }

        let status = governor.status().await;
        assert!(status.telemetry.enabled);
        assert_eq!(status.telemetry.consecutive_failures, 0);
        assert_eq!(status.telemetry.total_failures, 4);
    }

    #[tokio::test]
    async fn test_reset_telemetry_reenables_sampling() {
        let governor = Governor::new(config(), Arc::new(MockApplyHook::new())).unwrap();
        let source = Arc::new(MockTelemetrySource::unavailable("driver not loaded"));
        let mut controller = governor.controller(sampler(source.clone(), 0), None);

        for _ in 0..5 {
            controller.run_cycle().await;
        }
        assert!(!governor.status().await.telemetry.enabled);

        source
            .set_behavior(MockBehavior::Steady(fpgov_core::TelemetrySample::new(
                20.0, 60.0, 1200, 256,
            )))
            .await;
        governor.reset_telemetry().await;

        let report = controller.run_cycle().await;
        assert!(report.sample.is_some());
        assert!(report.telemetry_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_reevaluation_after_cooldown() {
        let config = config()
            .with_cooldown(Duration::from_secs(5))
            .with_thresholds(0.3, 0.7);
        let governor = Governor::new(config, Arc::new(MockApplyHook::new())).unwrap();
        let source = Arc::new(MockTelemetrySource::steady(50.0, 150.0));
        let mut controller = governor.controller(sampler(source, 0), None);

        // Narrow, then a large workload blocked by the cooldown
        governor.submit(&small_elementwise()).await.unwrap();
        let large = WorkloadDescriptor::of(OperationKind::MatMul, 4096 * 4096, 8);
        assert_eq!(governor.submit(&large).await.unwrap(), PrecisionTier::Narrow);

        let report = controller.run_cycle().await;
        assert!(report.decisions.is_empty());

        tokio::time::advance(Duration::from_secs(10)).await;
        let report = controller.run_cycle().await;
        assert_eq!(report.decisions.len(), 1);
        assert_eq!(report.decisions[0].effective_tier, PrecisionTier::Wide);
        assert_eq!(governor.current_tier(), PrecisionTier::Wide);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pin_rechecked_after_interval() {
        let hook = Arc::new(MockApplyHook::rejecting([PrecisionTier::Narrow]));
        let governor = Governor::new(config(), hook.clone()).unwrap();
        let source = Arc::new(MockTelemetrySource::steady(50.0, 150.0));
        let mut controller = governor.controller(sampler(source, 0), None);

        governor.submit(&small_elementwise()).await.unwrap();
        assert_eq!(governor.status().await.pinned_tier, Some(PrecisionTier::Narrow));
        let fallback = governor.decisions().await;
        assert!(matches!(fallback[0].outcome, ApplyOutcome::Fallback { .. }));

        // still unsupported at the first recheck
        tokio::time::advance(Duration::from_secs(60)).await;
        controller.run_cycle().await;
        assert_eq!(governor.status().await.pinned_tier, Some(PrecisionTier::Narrow));

        hook.set_supported(PrecisionTier::Narrow, true).await;
        tokio::time::advance(Duration::from_secs(60)).await;
        let report = controller.run_cycle().await;

        assert_eq!(governor.status().await.pinned_tier, None);
        assert_eq!(report.decisions[0].effective_tier, PrecisionTier::Narrow);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_abandons_hung_sample() {
        let config = config();
        let governor = Governor::new(config, Arc::new(MockApplyHook::new())).unwrap();
        let source = Arc::new(MockTelemetrySource::new(MockBehavior::Hang));
        let sampler = TelemetrySampler::from_source(
            source.clone(),
            SamplerConfig::new(TelemetryBackend::Mock)
                .with_max_retries(0)
                .with_sample_timeout(Duration::from_secs(3_600)),
        );

        let handle = governor.start(sampler, None).await.unwrap();
        // first read starts at 100ms and never returns
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(source.calls(), 1);

        handle.stop().await.unwrap();
        assert!(source.is_shut_down());
        assert!(!governor.is_running());
    }
}
