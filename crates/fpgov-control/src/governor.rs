//! The governor object
//!
//! [`Governor`] owns the single mutable aggregate (engine, applier, history,
//! energy, telemetry status) behind one async mutex, so submissions and the
//! feedback loop never race on tier transitions. The current tier is also
//! published on a watch channel and can be read without taking the lock.

use crate::analyzer::ComplexityAnalyzer;
use crate::applier::OptimizationApplier;
use crate::controller::{FeedbackController, TelemetryStatus};
use crate::decision::{Confidence, DecisionEngine};
use crate::energy::{EnergyAccountant, EnergyReport};
use crate::history::{ApplyOutcome, DecisionRecord, History, Trigger};
use crate::prompt::{PromptAnalyzer, PromptEstimate, WorkloadParams, WorkloadType};
use fpgov_core::{
    ApplyHook, ComplexityScore, Error, GovernorConfig, OptimizationProfile,
    PrecisionTier, Result, TelemetrySample, TelemetrySummary, TierCharacteristics,
    WorkloadDescriptor, WorkloadGate,
};
use fpgov_telemetry::{TelemetryCsvWriter, TelemetrySampler};

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub(crate) struct Shared {
    pub(crate) config: GovernorConfig,
    pub(crate) analyzer: ComplexityAnalyzer,
    pub(crate) prompts: PromptAnalyzer,
    pub(crate) state: Mutex<GovernorState>,
    pub(crate) tier_tx: watch::Sender<PrecisionTier>,
    pub(crate) running: AtomicBool,
}

/// Mutable governor state. Only reachable through `Shared::state`.
pub(crate) struct GovernorState {
    pub(crate) engine: DecisionEngine,
    pub(crate) applier: OptimizationApplier,
    pub(crate) history: History,
    pub(crate) energy: EnergyAccountant,
    pub(crate) telemetry: TelemetryStatus,
    pub(crate) pending: VecDeque<ComplexityScore>,
    pub(crate) last_score: Option<ComplexityScore>,
    pub(crate) last_evaluation: Option<Instant>,
}

impl GovernorState {
    /// Evaluate a score, apply the resulting profile, and record the outcome
    pub(crate) async fn decide(
        &mut self,
        score: ComplexityScore,
        trigger: Trigger,
        now: Instant,
        tier_tx: &watch::Sender<PrecisionTier>,
    ) -> DecisionRecord {
        // Stale samples do not count once the latest cycle failed
        let summary = if self.telemetry.enabled && self.telemetry.consecutive_failures == 0 {
            self.history.summary()
        } else {
            None
        };

        let decision = self.engine.evaluate(score, summary.as_ref(), now);
        let profile = OptimizationProfile::for_tier(decision.tier);

        let outcome = match self.applier.apply(&profile).await {
            Ok(_) => {
                self.engine.commit(decision.tier, now);
                if decision.is_transition() {
                    ApplyOutcome::Applied
                } else {
                    ApplyOutcome::Unchanged
                }
            }
            Err(e) => {
                self.engine.fallback(decision.tier, &e, now);
                ApplyOutcome::Fallback {
                    error: e.to_string(),
                }
            }
        };

        let effective = self.engine.current_tier();
        tier_tx.send_replace(effective);
        if !self.applier.is_confirmed(effective) {
            error!(
                "Runtime state unknown: {} could not be confirmed after a failed apply",
                effective
            );
        }

        self.last_score = Some(score);
        self.last_evaluation = Some(now);

        let record = DecisionRecord::new(&decision, trigger, effective, outcome, summary);
        self.history.push_decision(record.clone());
        record
    }

    /// Probe a pinned tier once its recheck period has passed
    pub(crate) async fn recheck_pin(&mut self, now: Instant, recheck_after: Duration) {
        if !self.engine.pin_due_for_recheck(now, recheck_after) {
            return;
        }
        let Some(tier) = self.engine.pinned() else {
            return;
        };

        match self.applier.probe(tier).await {
            Ok(()) => {
                info!("Capability recheck: {} is supported again", tier);
                self.engine.clear_pin();
            }
            Err(e) => {
                info!(
                    "Capability recheck: {} still unavailable ({}); tier in effect {}",
                    tier,
                    e,
                    self.engine.current_tier()
                );
                self.engine.renew_pin(now);
            }
        }
    }
}

/// Snapshot of the governor for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct GovernorStatus {
    pub current_tier: PrecisionTier,
    /// False when the last apply failed without the runtime accepting
    /// `current_tier`, or was interrupted
    pub runtime_confirmed: bool,
    pub pinned_tier: Option<PrecisionTier>,
    pub running: bool,
    pub telemetry: TelemetryStatus,
    pub last_score: Option<ComplexityScore>,
    pub pending_scores: usize,
    pub samples_recorded: u64,
    pub decisions_recorded: usize,
    pub transitions: u64,
    pub telemetry_summary: Option<TelemetrySummary>,
    /// Nominal savings of the tier in effect
    pub tier_characteristics: TierCharacteristics,
    pub energy: EnergyReport,
}

/// Aggregate view of the decision history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationSummary {
    pub decisions: usize,
    pub transitions: usize,
    pub fallbacks: usize,
    pub reduced_confidence: usize,
    pub average_score: f64,
    /// Decisions per effective tier
    pub tier_counts: BTreeMap<String, usize>,
}

/// Adaptive precision governor
#[derive(Clone)]
pub struct Governor {
    shared: Arc<Shared>,
}

impl Governor {
    /// Create a governor. Fails on invalid configuration.
    pub fn new(config: GovernorConfig, hook: Arc<dyn ApplyHook>) -> Result<Self> {
        config.validate()?;

        let engine = DecisionEngine::new(&config);
        let (tier_tx, _) = watch::channel(engine.current_tier());

        let state = GovernorState {
            engine,
            applier: OptimizationApplier::new(hook),
            history: History::new(config.history_capacity, config.summary_window),
            energy: EnergyAccountant::new(config.baseline_power_watts, config.sample_interval() * 2),
            telemetry: TelemetryStatus::default(),
            pending: VecDeque::new(),
            last_score: None,
            last_evaluation: None,
        };

        info!(
            "Created governor: thresholds {}/{}, cooldown {}ms, default tier {}",
            config.low_threshold, config.high_threshold, config.cooldown_ms, config.default_tier
        );

        Ok(Self {
            shared: Arc::new(Shared {
                analyzer: ComplexityAnalyzer::new(config.analyzer.clone()),
                prompts: PromptAnalyzer::new()?,
                config,
                state: Mutex::new(state),
                tier_tx,
                running: AtomicBool::new(false),
            }),
        })
    }

    /// Apply the profile of the initial tier. A rejected reduced tier falls
    /// back to Wide; a rejected Wide profile is an error.
    pub async fn initialize(&self) -> Result<PrecisionTier> {
        let mut state = self.shared.state.lock().await;
        let tier = state.engine.current_tier();

        if let Err(e) = state.applier.apply(&OptimizationProfile::for_tier(tier)).await {
            state.engine.fallback(tier, &e, Instant::now());
            self.shared.tier_tx.send_replace(state.engine.current_tier());
            if tier.is_wide() {
                error!("Runtime rejected the initial {} profile: {}", tier, e);
                return Err(e.into());
            }
        }

        let effective = state.engine.current_tier();
        info!("Governor initialized in {}", effective);
        Ok(effective)
    }

    /// Build a controller for this governor without spawning it
    pub fn controller(
        &self,
        sampler: TelemetrySampler,
        csv: Option<TelemetryCsvWriter>,
    ) -> FeedbackController {
        FeedbackController::new(Arc::clone(&self.shared), sampler, csv)
    }

    /// Initialize and spawn the feedback loop
    pub async fn start(
        &self,
        sampler: TelemetrySampler,
        csv: Option<TelemetryCsvWriter>,
    ) -> Result<GovernorHandle> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return Err(Error::governor("governor is already running"));
        }

        if let Err(e) = self.initialize().await {
            self.shared.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let controller = self.controller(sampler, csv);
        let task = tokio::spawn(controller.run(shutdown_rx));

        info!("Governor started");
        Ok(GovernorHandle {
            shared: Arc::clone(&self.shared),
            shutdown_tx,
            task,
            grace: self.shared.config.shutdown_grace(),
        })
    }

    /// Record a sample taken outside the feedback loop, attributed to the
    /// tier in effect
    pub async fn record_sample(&self, sample: &TelemetrySample) {
        let mut state = self.shared.state.lock().await;
        state.telemetry.record_success();

        let tier = state.engine.current_tier();
        state.energy.record_interval(sample, tier);
        state.history.push_sample(sample.clone());
    }

    /// Score a workload and decide immediately. Returns the tier in effect.
    pub async fn submit(&self, descriptor: &WorkloadDescriptor) -> Result<PrecisionTier> {
        let score = self.score(descriptor)?;
        Ok(self.submit_score(score).await)
    }

    /// Estimate a prompt and decide immediately
    pub async fn submit_prompt(&self, prompt: &str) -> Result<PrecisionTier> {
        let estimate = self.score_prompt(prompt)?;
        Ok(self.submit_score(estimate.score).await)
    }

    /// Score a named workload type and decide immediately
    pub async fn submit_workload_type(
        &self,
        workload_type: WorkloadType,
        params: &WorkloadParams,
    ) -> Result<PrecisionTier> {
        let score = workload_type.score(params);
        debug!("Workload type {} scored {}", workload_type, score);
        Ok(self.submit_score(score).await)
    }

    /// Decide on a score computed by the host
    pub async fn submit_score(&self, score: ComplexityScore) -> PrecisionTier {
        let mut state = self.shared.state.lock().await;
        let record = state
            .decide(score, Trigger::Submission, Instant::now(), &self.shared.tier_tx)
            .await;
        record.effective_tier
    }

    /// Score a workload and queue it for the next controller cycle
    pub async fn enqueue(&self, descriptor: &WorkloadDescriptor) -> Result<ComplexityScore> {
        let score = self.score(descriptor)?;

        let mut state = self.shared.state.lock().await;
        if state.pending.len() >= self.shared.config.history_capacity {
            warn!("Decision queue full; dropping oldest pending score");
            state.pending.pop_front();
        }
        state.pending.push_back(score);

        Ok(score)
    }

    /// Estimate a prompt without deciding
    pub fn score_prompt(&self, prompt: &str) -> Result<PromptEstimate> {
        self.shared.prompts.estimate(prompt).map_err(|e| {
            warn!("Rejected prompt: {}", e);
            e
        })
    }

    /// Score a workload without deciding
    pub fn score(&self, descriptor: &WorkloadDescriptor) -> Result<ComplexityScore> {
        self.shared.analyzer.score(descriptor).map_err(|e| {
            warn!("Rejected workload {:?}: {}", descriptor, e);
            e
        })
    }

    /// Tier in effect. Never waits on the state lock.
    pub fn current_tier(&self) -> PrecisionTier {
        *self.shared.tier_tx.borrow()
    }

    /// Receiver notified on every tier change
    pub fn subscribe(&self) -> watch::Receiver<PrecisionTier> {
        self.shared.tier_tx.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.shared.config
    }

    pub async fn status(&self) -> GovernorStatus {
        let state = self.shared.state.lock().await;
        let current_tier = state.engine.current_tier();

        GovernorStatus {
            current_tier,
            runtime_confirmed: state.applier.is_confirmed(current_tier),
            pinned_tier: state.engine.pinned(),
            running: self.is_running(),
            telemetry: state.telemetry.clone(),
            last_score: state.last_score,
            pending_scores: state.pending.len(),
            samples_recorded: state.history.samples_seen(),
            decisions_recorded: state.history.decision_count(),
            transitions: state.engine.transitions(),
            telemetry_summary: state.history.summary(),
            tier_characteristics: current_tier.characteristics(),
            energy: state.energy.report(),
        }
    }

    /// Recorded decisions, oldest first
    pub async fn decisions(&self) -> Vec<DecisionRecord> {
        self.shared.state.lock().await.history.decisions().cloned().collect()
    }

    pub async fn export_decisions_json(&self) -> Result<String> {
        let decisions = self.decisions().await;
        Ok(serde_json::to_string_pretty(&decisions)?)
    }

    pub async fn optimization_summary(&self) -> OptimizationSummary {
        let state = self.shared.state.lock().await;

        let mut summary = OptimizationSummary {
            decisions: 0,
            transitions: 0,
            fallbacks: 0,
            reduced_confidence: 0,
            average_score: 0.0,
            tier_counts: BTreeMap::new(),
        };
        let mut score_sum = 0.0;

        for record in state.history.decisions() {
            summary.decisions += 1;
            score_sum += record.score.value();
            if record.is_transition() {
                summary.transitions += 1;
            }
            if matches!(record.outcome, ApplyOutcome::Fallback { .. }) {
                summary.fallbacks += 1;
            }
            if record.confidence == Confidence::Reduced {
                summary.reduced_confidence += 1;
            }
            *summary
                .tier_counts
                .entry(record.effective_tier.to_string())
                .or_default() += 1;
        }

        if summary.decisions > 0 {
            summary.average_score = score_sum / summary.decisions as f64;
        }
        summary
    }

    pub async fn energy_report(&self) -> EnergyReport {
        self.shared.state.lock().await.energy.report()
    }

    /// Clear a capability pin now. Returns the tier that was pinned.
    pub async fn recheck_capability(&self) -> Option<PrecisionTier> {
        self.shared.state.lock().await.engine.clear_pin()
    }

    /// Re-enable telemetry after it was disabled by repeated failures
    pub async fn reset_telemetry(&self) {
        let mut state = self.shared.state.lock().await;
        if !state.telemetry.enabled {
            info!("Re-enabling telemetry");
        }
        state.telemetry.reset();
    }
}

#[async_trait]
impl WorkloadGate for Governor {
    async fn submit(&self, descriptor: &WorkloadDescriptor) -> Result<PrecisionTier> {
        Governor::submit(self, descriptor).await
    }

    fn current_tier(&self) -> PrecisionTier {
        Governor::current_tier(self)
    }
}

/// Handle to a running feedback loop
pub struct GovernorHandle {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    grace: Duration,
}

impl GovernorHandle {
    /// Signal the loop to stop and wait up to the grace period. The loop is
    /// aborted if it does not finish in time.
    pub async fn stop(self) -> Result<()> {
        info!("Stopping governor");
        let _ = self.shutdown_tx.send(true);

        let mut task = self.task;
        let result = match tokio::time::timeout(self.grace, &mut task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) if e.is_cancelled() => Ok(()),
            Ok(Err(e)) => Err(Error::governor(format!("feedback loop failed: {}", e))),
            Err(_) => {
                warn!("Feedback loop did not stop within {:?}; aborting", self.grace);
                task.abort();
                Ok(())
            }
        };

        self.shared.running.store(false, Ordering::SeqCst);
        info!("Governor stopped");
        result
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
