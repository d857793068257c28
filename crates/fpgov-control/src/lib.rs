//! # fpgov-control
//!
//! The control core of the fpgov precision governor.
//!
//! This crate provides:
//! - [`ComplexityAnalyzer`]: pure mapping from workload descriptors to scores
//! - [`PromptAnalyzer`] and [`WorkloadType`]: scores for prompt text and
//!   named AI workload types
//! - [`DecisionEngine`]: the tier state machine with hysteresis, cooldown and
//!   capability pinning
//! - [`OptimizationApplier`]: idempotent profile application with a Wide
//!   safety fallback
//! - [`FeedbackController`]: the sampling and re-evaluation loop
//! - [`Governor`]: the object hosts construct, submit workloads to, and stop
//!
//! ## Example
//!
//! ```rust,no_run
//! use fpgov_control::{Governor, LoggingApplyHook};
//! use fpgov_core::{GovernorConfig, OperationKind, WorkloadDescriptor};
//! use fpgov_telemetry::{SamplerConfig, TelemetryBackend, TelemetrySampler};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GovernorConfig::load()?;
//!     let sampler = TelemetrySampler::new(SamplerConfig::from_governor(&config, TelemetryBackend::Smi))?;
//!
//!     let governor = Governor::new(config, Arc::new(LoggingApplyHook::new()))?;
//!     let handle = governor.start(sampler, None).await?;
//!
//!     let tier = governor
//!         .submit(&WorkloadDescriptor::of(OperationKind::MatMul, 1024 * 1024, 4))
//!         .await?;
//!     println!("running in {}", tier);
//!
//!     handle.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod analyzer;
pub mod applier;
pub mod controller;
pub mod decision;
pub mod energy;
pub mod governor;
pub mod history;
pub mod hook;
pub mod prompt;

pub use analyzer::ComplexityAnalyzer;
pub use applier::{AppliedState, OptimizationApplier};
pub use controller::{CycleReport, FeedbackController, TelemetryStatus};
pub use decision::{Confidence, Decision, DecisionEngine, DecisionReason};
pub use energy::{format_joules, format_watts, EnergyAccountant, EnergyReport};
pub use governor::{Governor, GovernorHandle, GovernorStatus, OptimizationSummary};
pub use history::{ApplyOutcome, DecisionRecord, History, Trigger};
pub use hook::LoggingApplyHook;
pub use prompt::{PromptAnalyzer, PromptEstimate, WorkloadParams, WorkloadType};
