//! Energy savings accounting
//!
//! Savings accumulate only while a reduced-precision tier is in effect, as the
//! integral of `max(0, baseline - observed)` power over time. The baseline is
//! the mean power observed in Wide, or the configured estimate before any Wide
//! sample has been seen.

use fpgov_core::{PrecisionTier, TelemetrySample};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Cumulative energy figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyReport {
    /// Estimated energy saved versus running Wide, in joules. Never negative.
    pub total_joules_saved: f64,

    /// Time spent in reduced-precision tiers, in seconds
    pub narrow_seconds: f64,

    /// Baseline power the savings were measured against
    pub baseline_watts: f64,

    /// Measured savings as a share of baseline energy while in reduced tiers
    pub avg_estimated_power_saved_percent: f64,
}

/// Result of accounting one sample interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyInterval {
    pub seconds: f64,
    pub joules_saved: f64,
    /// A reduced tier drew at least the Wide baseline
    pub anomaly: bool,
}

/// Integrates power savings across telemetry samples
#[derive(Debug)]
pub struct EnergyAccountant {
    default_baseline_watts: f64,
    max_interval: Duration,
    wide_power_sum: f64,
    wide_samples: u64,
    joules_saved: f64,
    narrow_seconds: f64,
    last_timestamp: Option<DateTime<Utc>>,
}

impl EnergyAccountant {
    /// `max_interval` caps the time credited between two samples so a gap in
    /// telemetry is not counted as time spent in the tier.
    pub fn new(default_baseline_watts: f64, max_interval: Duration) -> Self {
        Self {
            default_baseline_watts,
            max_interval,
            wide_power_sum: 0.0,
            wide_samples: 0,
            joules_saved: 0.0,
            narrow_seconds: 0.0,
            last_timestamp: None,
        }
    }

    /// Account the interval ending at `sample`, taken while `tier` was in effect
    pub fn record_interval(&mut self, sample: &TelemetrySample, tier: PrecisionTier) -> EnergyInterval {
        let seconds = match self.last_timestamp {
            Some(last) => (sample.timestamp - last)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(self.max_interval)
                .as_secs_f64(),
            None => 0.0,
        };
        self.last_timestamp = Some(sample.timestamp);

        if tier.is_wide() {
            self.wide_power_sum += sample.power_watts;
            self.wide_samples += 1;
            return EnergyInterval {
                seconds,
                joules_saved: 0.0,
                anomaly: false,
            };
        }

        let baseline = self.baseline_watts();
        let anomaly = sample.power_watts >= baseline;
        if anomaly {
            warn!(
                "{} tier drawing {:.1}W, at or above the {:.1}W baseline",
                tier, sample.power_watts, baseline
            );
        }

        let joules_saved = (baseline - sample.power_watts).max(0.0) * seconds;
        self.joules_saved += joules_saved;
        self.narrow_seconds += seconds;

        EnergyInterval {
            seconds,
            joules_saved,
            anomaly,
        }
    }

    /// Mean Wide-tier power, or the configured estimate
    pub fn baseline_watts(&self) -> f64 {
        if self.wide_samples == 0 {
            self.default_baseline_watts
        } else {
            self.wide_power_sum / self.wide_samples as f64
        }
    }

    pub fn report(&self) -> EnergyReport {
        let baseline_watts = self.baseline_watts();
        let baseline_joules = baseline_watts * self.narrow_seconds;
        let avg_estimated_power_saved_percent = if baseline_joules > 0.0 {
            self.joules_saved / baseline_joules * 100.0
        } else {
            0.0
        };

        EnergyReport {
            total_joules_saved: self.joules_saved,
            narrow_seconds: self.narrow_seconds,
            baseline_watts,
            avg_estimated_power_saved_percent,
        }
    }
}

/// Format an energy amount with a readable unit
pub fn format_joules(joules: f64) -> String {
    let magnitude = joules.abs();
    if magnitude >= 1_000.0 {
        format!("{:.2} kJ", joules / 1_000.0)
    } else if magnitude >= 1.0 || magnitude == 0.0 {
        format!("{:.2} J", joules)
    } else {
        format!("{:.2} mJ", joules * 1_000.0)
    }
}

/// Format a power reading with a readable unit
pub fn format_watts(watts: f64) -> String {
    let magnitude = watts.abs();
    if magnitude >= 1_000.0 {
        format!("{:.2} kW", watts / 1_000.0)
    } else if magnitude >= 1.0 || magnitude == 0.0 {
        format!("{:.2} W", watts)
    } else {
        format!("{:.2} mW", watts * 1_000.0)
    }
}
