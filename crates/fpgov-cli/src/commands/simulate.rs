//! `fpgov simulate`
//!
//! Drives a governor with scripted workloads against the mock telemetry
//! backend. The simulated runtime lowers the mock's power draw by the nominal
//! savings of whatever tier the governor applies, so the energy report
//! reflects the decisions that were made.

use crate::output::{
    colorize_tier, format_duration, format_percentage, Formattable, OutputFormat, OutputFormatter,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use fpgov_control::{
    format_joules, format_watts, ApplyOutcome, Confidence, DecisionRecord, EnergyReport, Governor,
    OptimizationSummary, Trigger,
};
use fpgov_core::{
    ApplyError, ApplyHook, DataTypeHint, GovernorConfig, OperationKind, OptimizationProfile,
    PrecisionTier, TelemetrySample, WorkloadDescriptor,
};
use fpgov_telemetry::mock::{MockBehavior, MockTelemetrySource};
use fpgov_telemetry::{SamplerConfig, TelemetryBackend, TelemetryCsvWriter, TelemetrySampler};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Power drawn by the simulated device while in Wide
pub const SIMULATED_WIDE_WATTS: f64 = 250.0;

const SIMULATED_UTILIZATION: f64 = 85.0;
const SIMULATED_CLOCK_MHZ: u32 = 1410;
const SIMULATED_MEMORY_MIB: u64 = 16_384;

/// Parse `op:elements[:batch[:dtype]]`
pub fn parse_workload(spec: &str) -> std::result::Result<WorkloadDescriptor, String> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() < 2 || parts.len() > 4 {
        return Err(format!(
            "Invalid workload '{}', expected op:elements[:batch[:dtype]]",
            spec
        ));
    }

    let operation: OperationKind = parts[0].parse()?;
    let element_count: u64 = parts[1]
        .parse()
        .map_err(|e| format!("Invalid element count '{}': {}", parts[1], e))?;
    let batch_size: u64 = match parts.get(2) {
        Some(batch) => batch
            .parse()
            .map_err(|e| format!("Invalid batch size '{}': {}", batch, e))?,
        None => 1,
    };
    let dtype_hint: DataTypeHint = match parts.get(3) {
        Some(dtype) => dtype.parse()?,
        None => DataTypeHint::Unknown,
    };

    Ok(WorkloadDescriptor::new(
        operation,
        element_count,
        batch_size,
        dtype_hint,
    ))
}

/// Runtime stand-in that couples applied profiles to mock power draw
pub struct SimulatedRuntime {
    source: Arc<MockTelemetrySource>,
    wide_watts: f64,
    applied: AtomicU64,
}

impl SimulatedRuntime {
    pub fn new(source: Arc<MockTelemetrySource>, wide_watts: f64) -> Self {
        Self {
            source,
            wide_watts,
            applied: AtomicU64::new(0),
        }
    }

    /// Power the simulated device draws in a tier
    pub fn power_for(&self, tier: PrecisionTier) -> f64 {
        self.wide_watts * (1.0 - tier.characteristics().power_saved_percent / 100.0)
    }

    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ApplyHook for SimulatedRuntime {
    async fn apply(&self, profile: &OptimizationProfile) -> std::result::Result<(), ApplyError> {
        let power = self.power_for(profile.tier());
        self.source
            .set_behavior(MockBehavior::Steady(TelemetrySample::new(
                SIMULATED_UTILIZATION,
                power,
                SIMULATED_CLOCK_MHZ,
                SIMULATED_MEMORY_MIB,
            )))
            .await;
        self.applied.fetch_add(1, Ordering::SeqCst);

        debug!("Simulated runtime now in {} at {:.1}W", profile, power);
        Ok(())
    }
}

/// Options of one simulation run
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub duration: Duration,
    pub out: PathBuf,
    pub workloads: Vec<WorkloadDescriptor>,
    pub interval: Option<Duration>,
    pub cooldown: Option<Duration>,
    /// Write the decision history as JSON
    pub decisions_out: Option<PathBuf>,
}

/// Everything a simulation produced
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub elapsed_secs: u64,
    pub workloads: usize,
    pub final_tier: PrecisionTier,
    pub summary: OptimizationSummary,
    pub energy: EnergyReport,
    pub decisions: Vec<DecisionRecord>,
}

impl Formattable for SimulationReport {
    fn table_headers() -> Vec<String> {
        vec![
            "Workloads".to_string(),
            "Decisions".to_string(),
            "Transitions".to_string(),
            "Saved".to_string(),
            "Tier".to_string(),
        ]
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.workloads.to_string(),
            self.summary.decisions.to_string(),
            self.summary.transitions.to_string(),
            format_joules(self.energy.total_joules_saved),
            self.final_tier.to_string(),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        let tier_counts = self
            .summary
            .tier_counts
            .iter()
            .map(|(tier, count)| format!("{}={}", tier, count))
            .collect::<Vec<_>>()
            .join(", ");

        vec![
            ("Elapsed".to_string(), format_duration(self.elapsed_secs)),
            ("Workloads".to_string(), self.workloads.to_string()),
            ("Decisions".to_string(), self.summary.decisions.to_string()),
            ("Transitions".to_string(), self.summary.transitions.to_string()),
            ("Fallbacks".to_string(), self.summary.fallbacks.to_string()),
            (
                "Reduced Confidence".to_string(),
                self.summary.reduced_confidence.to_string(),
            ),
            (
                "Average Score".to_string(),
                format!("{:.4}", self.summary.average_score),
            ),
            ("Tier Counts".to_string(), tier_counts),
            (
                "Energy Saved".to_string(),
                format_joules(self.energy.total_joules_saved),
            ),
            (
                "Reduced-Tier Time".to_string(),
                format!("{:.1}s", self.energy.narrow_seconds),
            ),
            ("Baseline".to_string(), format_watts(self.energy.baseline_watts)),
            (
                "Power Saved".to_string(),
                format_percentage(self.energy.avg_estimated_power_saved_percent),
            ),
            ("Final Tier".to_string(), colorize_tier(self.final_tier).to_string()),
        ]
    }
}

impl Formattable for DecisionRecord {
    fn table_headers() -> Vec<String> {
        vec![
            "Time".to_string(),
            "Trigger".to_string(),
            "Score".to_string(),
            "From".to_string(),
            "Requested".to_string(),
            "Effective".to_string(),
            "Reason".to_string(),
            "Outcome".to_string(),
        ]
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.timestamp.format("%H:%M:%S%.3f").to_string(),
            trigger_label(self.trigger).to_string(),
            format!("{:.4}", self.score.value()),
            self.from_tier.to_string(),
            self.requested_tier.to_string(),
            self.effective_tier.to_string(),
            self.reason.to_string(),
            outcome_label(&self.outcome),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("Time".to_string(), self.timestamp.to_rfc3339()),
            ("Trigger".to_string(), trigger_label(self.trigger).to_string()),
            ("Score".to_string(), format!("{:.4}", self.score.value())),
            ("From".to_string(), self.from_tier.to_string()),
            ("Requested".to_string(), self.requested_tier.to_string()),
            ("Effective".to_string(), self.effective_tier.to_string()),
            (
                "Confidence".to_string(),
                match self.confidence {
                    Confidence::Full => "full",
                    Confidence::Reduced => "reduced",
                }
                .to_string(),
            ),
            ("Reason".to_string(), self.reason.to_string()),
            ("Outcome".to_string(), outcome_label(&self.outcome)),
        ]
    }
}

fn trigger_label(trigger: Trigger) -> &'static str {
    match trigger {
        Trigger::Submission => "submission",
        Trigger::Queued => "queued",
        Trigger::Reevaluation => "reevaluation",
    }
}

fn outcome_label(outcome: &ApplyOutcome) -> String {
    match outcome {
        ApplyOutcome::Unchanged => "unchanged".to_string(),
        ApplyOutcome::Applied => "applied".to_string(),
        ApplyOutcome::Fallback { error } => format!("fallback: {}", error),
    }
}

/// Run the simulation and collect its report
pub async fn run_simulation(
    mut config: GovernorConfig,
    options: SimulateOptions,
) -> Result<SimulationReport> {
    if options.workloads.is_empty() {
        bail!("At least one --workload is required");
    }
    if let Some(interval) = options.interval {
        config = config.with_sample_interval(interval);
    }
    if let Some(cooldown) = options.cooldown {
        config = config.with_cooldown(cooldown);
    }
    config.validate().context("Invalid simulation settings")?;

    let source = Arc::new(MockTelemetrySource::steady(
        SIMULATED_UTILIZATION,
        SIMULATED_WIDE_WATTS,
    ));
    let runtime: Arc<dyn ApplyHook> =
        Arc::new(SimulatedRuntime::new(Arc::clone(&source), SIMULATED_WIDE_WATTS));
    let sampler = TelemetrySampler::from_source(
        Arc::clone(&source),
        SamplerConfig::from_governor(&config, TelemetryBackend::Mock),
    );

    let csv = TelemetryCsvWriter::open(&options.out)
        .with_context(|| format!("Failed to open {} for writing", options.out.display()))?;

    let governor = Governor::new(config, runtime)?;
    let started = tokio::time::Instant::now();
    let handle = governor.start(sampler, Some(csv)).await?;

    // Spread submissions evenly over the run
    let spacing = options.duration / options.workloads.len() as u32;
    for descriptor in &options.workloads {
        let tier = governor.submit(descriptor).await?;
        info!(
            "Submitted {} x{} ({} elements), tier {}",
            descriptor.operation, descriptor.batch_size, descriptor.element_count, tier
        );
        tokio::time::sleep(spacing).await;
    }

    handle.stop().await?;

    if let Some(path) = &options.decisions_out {
        let json = governor.export_decisions_json().await?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write decisions to {}", path.display()))?;
    }

    Ok(SimulationReport {
        elapsed_secs: started.elapsed().as_secs(),
        workloads: options.workloads.len(),
        final_tier: governor.current_tier(),
        summary: governor.optimization_summary().await,
        energy: governor.energy_report().await,
        decisions: governor.decisions().await,
    })
}

pub async fn simulate(
    config: GovernorConfig,
    options: SimulateOptions,
    formatter: &OutputFormatter,
) -> Result<()> {
    let decisions_out = options.decisions_out.clone();
    let report = run_simulation(config, options).await?;

    match formatter.format() {
        OutputFormat::Json | OutputFormat::Yaml => formatter.print_item(&report)?,
        OutputFormat::Table | OutputFormat::Text => {
            formatter.print_list(&report.decisions)?;
            println!();
            formatter.print_item(&report)?;
            if let Some(path) = decisions_out {
                formatter.print_success(&format!("Decisions written to {}", path.display()))?;
            }
        }
    }

    Ok(())
}
