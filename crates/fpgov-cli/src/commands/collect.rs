//! `fpgov collect`

use crate::output::{colorize_tier, format_duration, Formattable, OutputFormatter};
use anyhow::{Context, Result};
use fpgov_control::{Governor, LoggingApplyHook};
use fpgov_core::{GovernorConfig, PrecisionTier};
use fpgov_telemetry::{SamplerConfig, TelemetryBackend, TelemetryCsvWriter, TelemetrySampler};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Options of one collection run
#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub duration: Duration,
    pub out: PathBuf,
    pub interval: Option<Duration>,
    pub backend: TelemetryBackend,
    pub gpu_index: u32,
    /// Overrides the `nvidia-smi` executable
    pub smi_binary: Option<PathBuf>,
}

/// Summary printed when collection ends
#[derive(Debug, Clone, Serialize)]
pub struct CollectReport {
    pub path: PathBuf,
    pub backend: TelemetryBackend,
    pub gpu_index: u32,
    pub elapsed_secs: u64,
    pub samples: u64,
    pub telemetry_failures: u64,
    pub telemetry_enabled: bool,
    pub final_tier: PrecisionTier,
}

impl Formattable for CollectReport {
    fn table_headers() -> Vec<String> {
        vec![
            "File".to_string(),
            "Backend".to_string(),
            "Samples".to_string(),
            "Failures".to_string(),
            "Tier".to_string(),
        ]
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.path.display().to_string(),
            self.backend.to_string(),
            self.samples.to_string(),
            self.telemetry_failures.to_string(),
            self.final_tier.to_string(),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("File".to_string(), self.path.display().to_string()),
            (
                "Backend".to_string(),
                format!("{} (gpu {})", self.backend, self.gpu_index),
            ),
            ("Elapsed".to_string(), format_duration(self.elapsed_secs)),
            ("Samples".to_string(), self.samples.to_string()),
            ("Failures".to_string(), self.telemetry_failures.to_string()),
            (
                "Telemetry".to_string(),
                if self.telemetry_enabled { "enabled" } else { "disabled" }.to_string(),
            ),
            ("Tier".to_string(), colorize_tier(self.final_tier).to_string()),
        ]
    }
}

/// Sample the device for the requested duration and append rows to a CSV
/// file. Fails before writing anything if the first sample cannot be taken.
pub async fn collect(
    config: GovernorConfig,
    options: CollectOptions,
    formatter: &OutputFormatter,
) -> Result<()> {
    let report = run_collection(config, options, formatter).await?;

    formatter.print_item(&report)?;
    if !report.telemetry_enabled {
        formatter.print_warning("Telemetry was disabled after repeated failures")?;
    }

    Ok(())
}

async fn run_collection(
    mut config: GovernorConfig,
    options: CollectOptions,
    formatter: &OutputFormatter,
) -> Result<CollectReport> {
    if let Some(interval) = options.interval {
        config = config.with_sample_interval(interval);
    }
    config.validate().context("Invalid collection settings")?;

    let mut sampler_config =
        SamplerConfig::from_governor(&config, options.backend).with_gpu_index(options.gpu_index);
    if let Some(binary) = &options.smi_binary {
        sampler_config = sampler_config.with_smi_binary(binary);
    }
    let sampler = TelemetrySampler::new(sampler_config)?;

    formatter.print_progress("Checking telemetry");
    let first = sampler.sample_with_retry().await;
    formatter.clear_progress();
    let first = first.with_context(|| {
        format!(
            "Telemetry unavailable on {} backend (gpu {})",
            options.backend, options.gpu_index
        )
    })?;

    let governor = Governor::new(config, Arc::new(LoggingApplyHook::new()))?;
    let mut csv = open_csv(&options.out)?;
    csv.append(&first, governor.current_tier())?;
    governor.record_sample(&first).await;

    info!(
        "Collecting {} telemetry into {} for {}s",
        options.backend,
        options.out.display(),
        options.duration.as_secs()
    );

    let started = tokio::time::Instant::now();
    let handle = governor.start(sampler, Some(csv)).await?;

    tokio::select! {
        _ = tokio::time::sleep(options.duration) => {}
        _ = tokio::signal::ctrl_c() => {
            formatter.print_warning("Interrupted, stopping collection")?;
        }
    }

    handle.stop().await?;
    let status = governor.status().await;

    Ok(CollectReport {
        path: options.out,
        backend: options.backend,
        gpu_index: options.gpu_index,
        elapsed_secs: started.elapsed().as_secs(),
        samples: status.samples_recorded,
        telemetry_failures: status.telemetry.total_failures,
        telemetry_enabled: status.telemetry.enabled,
        final_tier: status.current_tier,
    })
}

fn open_csv(path: &Path) -> Result<TelemetryCsvWriter> {
    TelemetryCsvWriter::open(path)
        .with_context(|| format!("Failed to open {} for writing", path.display()))
}
