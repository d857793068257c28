//! # fpgov-telemetry
//!
//! Device telemetry for the fpgov governor.
//!
//! This crate provides:
//! - A bounded-retry [`TelemetrySampler`] over any [`TelemetrySource`]
//! - An `nvidia-smi` backed source for NVIDIA devices
//! - A scriptable mock source for tests and simulations
//! - Append-only CSV export of samples tagged with the active precision tier
//!
//! ## Example
//!
//! ```rust,no_run
//! use fpgov_telemetry::{SamplerConfig, TelemetryBackend, TelemetrySampler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SamplerConfig::new(TelemetryBackend::Smi)
//!         .with_gpu_index(0)
//!         .with_max_retries(2);
//!
//!     let sampler = TelemetrySampler::new(config)?;
//!     let sample = sampler.sample_with_retry().await?;
//!     println!("{:.1}% at {:.0}W", sample.utilization_pct, sample.power_watts);
//!
//!     sampler.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! [`TelemetrySource`]: fpgov_core::TelemetrySource

use thiserror::Error;

pub mod config;
pub mod export;
pub mod sampler;

#[cfg(feature = "smi")]
pub mod smi;

// Mock implementation for testing
#[cfg(any(feature = "mock", test))]
pub mod mock;

pub use config::{SamplerConfig, TelemetryBackend};
pub use export::{TelemetryCsvWriter, CSV_HEADER};
pub use sampler::TelemetrySampler;

/// Errors raised while exporting telemetry
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_error_display() {
        let error = ExportError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only",
        ));
        assert_eq!(error.to_string(), "IO error: read-only");
    }
}
