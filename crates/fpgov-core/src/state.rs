//! Telemetry samples and the rolling summaries derived from them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One reading of the device counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// When the reading was taken
    pub timestamp: DateTime<Utc>,

    /// GPU utilization percentage (0-100)
    pub utilization_pct: f64,

    /// Power draw in watts
    pub power_watts: f64,

    /// Graphics clock in MHz
    pub clock_mhz: u32,

    /// Device memory in use, MiB
    pub memory_used_mib: u64,
}

impl TelemetrySample {
    /// Create a sample stamped with the current time
    pub fn new(utilization_pct: f64, power_watts: f64, clock_mhz: u32, memory_used_mib: u64) -> Self {
        Self {
            timestamp: Utc::now(),
            utilization_pct: utilization_pct.clamp(0.0, 100.0),
            power_watts: power_watts.max(0.0),
            clock_mhz,
            memory_used_mib,
        }
    }

    /// Replace the timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Performance state implied by utilization
    pub fn performance_state(&self) -> PerformanceState {
        PerformanceState::classify(self.utilization_pct)
    }
}

/// Coarse load classification of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PerformanceState {
    /// Below 10% utilization
    Idle,
    /// Below 50%
    Light,
    /// Below 85%
    Busy,
    /// 85% and above
    Saturated,
}

impl PerformanceState {
    /// Classify a utilization percentage
    pub fn classify(utilization_pct: f64) -> Self {
        if utilization_pct < 10.0 {
            PerformanceState::Idle
        } else if utilization_pct < 50.0 {
            PerformanceState::Light
        } else if utilization_pct < 85.0 {
            PerformanceState::Busy
        } else {
            PerformanceState::Saturated
        }
    }
}

impl fmt::Display for PerformanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerformanceState::Idle => write!(f, "idle"),
            PerformanceState::Light => write!(f, "light"),
            PerformanceState::Busy => write!(f, "busy"),
            PerformanceState::Saturated => write!(f, "saturated"),
        }
    }
}

/// Averages over the most recent telemetry samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySummary {
    /// Number of samples in the window
    pub samples: usize,

    pub avg_utilization_pct: f64,

    pub avg_power_watts: f64,

    pub peak_power_watts: f64,

    pub avg_clock_mhz: f64,

    pub avg_memory_used_mib: f64,

    /// Classification of the average utilization
    pub performance_state: PerformanceState,

    /// Timestamp of the oldest sample in the window
    pub window_start: DateTime<Utc>,

    /// Timestamp of the newest sample in the window
    pub window_end: DateTime<Utc>,
}

impl TelemetrySummary {
    /// Summarize a window of samples. Returns `None` for an empty window.
    pub fn from_samples(samples: &[TelemetrySample]) -> Option<Self> {
        let first = samples.first()?;
        let last = samples.last()?;
        let n = samples.len() as f64;

        let mut utilization = 0.0;
        let mut power = 0.0;
        let mut peak_power = f64::MIN;
        let mut clock = 0.0;
        let mut memory = 0.0;

        for sample in samples {
            utilization += sample.utilization_pct;
            power += sample.power_watts;
            peak_power = peak_power.max(sample.power_watts);
            clock += sample.clock_mhz as f64;
            memory += sample.memory_used_mib as f64;
        }

        let avg_utilization_pct = utilization / n;

        Some(Self {
            samples: samples.len(),
            avg_utilization_pct,
            avg_power_watts: power / n,
            peak_power_watts: peak_power,
            avg_clock_mhz: clock / n,
            avg_memory_used_mib: memory / n,
            performance_state: PerformanceState::classify(avg_utilization_pct),
            window_start: first.timestamp,
            window_end: last.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_creation_clamps_inputs() {
        let sample = TelemetrySample::new(140.0, -3.0, 1500, 2048);
        assert_eq!(sample.utilization_pct, 100.0);
        assert_eq!(sample.power_watts, 0.0);
        assert_eq!(sample.clock_mhz, 1500);
    }

    #[test]
    fn test_performance_state_classification() {
        assert_eq!(PerformanceState::classify(2.0), PerformanceState::Idle);
        assert_eq!(PerformanceState::classify(30.0), PerformanceState::Light);
        assert_eq!(PerformanceState::classify(70.0), PerformanceState::Busy);
        assert_eq!(PerformanceState::classify(99.0), PerformanceState::Saturated);
    }

    #[test]
    fn test_summary_of_empty_window() {
        assert!(TelemetrySummary::from_samples(&[]).is_none());
    }

    #[test]
    fn test_summary_averages() {
        let samples = vec![
            TelemetrySample::new(40.0, 100.0, 1400, 1000),
            TelemetrySample::new(60.0, 140.0, 1600, 3000),
        ];
        let summary = TelemetrySummary::from_samples(&samples).unwrap();

        assert_eq!(summary.samples, 2);
        assert_eq!(summary.avg_utilization_pct, 50.0);
        assert_eq!(summary.avg_power_watts, 120.0);
        assert_eq!(summary.peak_power_watts, 140.0);
        assert_eq!(summary.avg_clock_mhz, 1500.0);
        assert_eq!(summary.avg_memory_used_mib, 2000.0);
        assert_eq!(summary.performance_state, PerformanceState::Busy);
        assert_eq!(summary.window_start, samples[0].timestamp);
        assert_eq!(summary.window_end, samples[1].timestamp);
    }
}
