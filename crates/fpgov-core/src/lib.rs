//! # fpgov-core
//!
//! Core types, traits, and configuration for fpgov - an adaptive governor that
//! picks a floating-point precision tier for GPU workloads.
//!
//! This crate provides the foundational data structures and interfaces that are
//! shared across all other fpgov components. It includes:
//!
//! - Workload descriptors, complexity scores, precision tiers and their
//!   optimization profiles
//! - Telemetry samples and rolling summaries
//! - Traits for telemetry sources and precision apply hooks
//! - Configuration schema and layered loading
//! - Error handling types and utilities

pub mod config;
pub mod error;
pub mod state;
pub mod traits;
pub mod types;

// Re-export commonly used types at the crate root
pub use config::{AnalyzerConfig, GovernorConfig};
pub use error::{ApplyError, ConfigError, Error, Result, TelemetryError};
pub use state::{PerformanceState, TelemetrySample, TelemetrySummary};
pub use traits::{ApplyHook, TelemetrySource, WorkloadGate};
pub use types::{
    ComplexityScore, ComputeDtype, DataTypeHint, OperationKind, OptimizationProfile,
    PrecisionTier, TierCharacteristics, WorkloadDescriptor,
};
