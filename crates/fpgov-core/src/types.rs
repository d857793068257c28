//! Core type definitions for fpgov

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of operation a workload performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Dense matrix multiplication (GEMM)
    MatMul,
    /// Convolution
    Convolution,
    /// Attention blocks
    Attention,
    /// Reductions (sum, mean, softmax denominators)
    Reduction,
    /// Pointwise arithmetic
    Elementwise,
    /// Anything the adapter could not classify
    Other,
}

impl OperationKind {
    /// All known operation kinds
    pub const ALL: [OperationKind; 6] = [
        OperationKind::MatMul,
        OperationKind::Convolution,
        OperationKind::Attention,
        OperationKind::Reduction,
        OperationKind::Elementwise,
        OperationKind::Other,
    ];
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "matmul" | "gemm" | "linear" => Ok(OperationKind::MatMul),
            "convolution" | "conv" => Ok(OperationKind::Convolution),
            "attention" | "attn" => Ok(OperationKind::Attention),
            "reduction" | "reduce" => Ok(OperationKind::Reduction),
            "elementwise" | "pointwise" => Ok(OperationKind::Elementwise),
            "other" => Ok(OperationKind::Other),
            _ => Err(format!("Unknown operation kind: {}", s)),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::MatMul => write!(f, "matmul"),
            OperationKind::Convolution => write!(f, "convolution"),
            OperationKind::Attention => write!(f, "attention"),
            OperationKind::Reduction => write!(f, "reduction"),
            OperationKind::Elementwise => write!(f, "elementwise"),
            OperationKind::Other => write!(f, "other"),
        }
    }
}

/// Data type the adapter expects the workload to run in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataTypeHint {
    Float64,
    Float32,
    Float16,
    BFloat16,
    Int8,
    #[default]
    Unknown,
}

impl std::str::FromStr for DataTypeHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "float64" | "f64" | "fp64" | "double" => Ok(DataTypeHint::Float64),
            "float32" | "f32" | "fp32" | "float" => Ok(DataTypeHint::Float32),
            "float16" | "f16" | "fp16" | "half" => Ok(DataTypeHint::Float16),
            "bfloat16" | "bf16" => Ok(DataTypeHint::BFloat16),
            "int8" | "i8" => Ok(DataTypeHint::Int8),
            "unknown" | "" => Ok(DataTypeHint::Unknown),
            _ => Err(format!("Unknown data type hint: {}", s)),
        }
    }
}

impl fmt::Display for DataTypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataTypeHint::Float64 => write!(f, "float64"),
            DataTypeHint::Float32 => write!(f, "float32"),
            DataTypeHint::Float16 => write!(f, "float16"),
            DataTypeHint::BFloat16 => write!(f, "bfloat16"),
            DataTypeHint::Int8 => write!(f, "int8"),
            DataTypeHint::Unknown => write!(f, "unknown"),
        }
    }
}

/// Description of a workload submitted by the framework adapter.
///
/// Immutable once built. Sizes are validated by [`WorkloadDescriptor::validate`]
/// and by the complexity analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadDescriptor {
    /// Operation kind
    pub operation: OperationKind,

    /// Number of elements per batch item
    pub element_count: u64,

    /// Batch size
    pub batch_size: u64,

    /// Data type hint from the adapter
    pub dtype_hint: DataTypeHint,
}

impl WorkloadDescriptor {
    /// Create a new workload descriptor
    pub fn new(
        operation: OperationKind,
        element_count: u64,
        batch_size: u64,
        dtype_hint: DataTypeHint,
    ) -> Self {
        Self {
            operation,
            element_count,
            batch_size,
            dtype_hint,
        }
    }

    /// Shorthand for a descriptor without a data type hint
    pub fn of(operation: OperationKind, element_count: u64, batch_size: u64) -> Self {
        Self::new(operation, element_count, batch_size, DataTypeHint::Unknown)
    }

    /// Reject zero sizes
    pub fn validate(&self) -> crate::Result<()> {
        if self.element_count == 0 {
            return Err(crate::Error::invalid_workload(
                "element_count must be greater than zero",
            ));
        }
        if self.batch_size == 0 {
            return Err(crate::Error::invalid_workload(
                "batch_size must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Total elements touched by the workload, saturating on overflow
    pub fn total_elements(&self) -> u64 {
        self.element_count.saturating_mul(self.batch_size)
    }
}

/// Normalized complexity of a workload, always within `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComplexityScore(f64);

impl ComplexityScore {
    /// Lowest possible score
    pub const MIN: ComplexityScore = ComplexityScore(0.0);

    /// Highest possible score
    pub const MAX: ComplexityScore = ComplexityScore(1.0);

    /// Create a score, clamping into `[0, 1]`. NaN maps to 0.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self::MIN;
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// Raw value
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for ComplexityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.0)
    }
}

/// Numeric precision tier the runtime executes in.
///
/// The governor itself only moves between Wide and one efficient tier, but the
/// set of tiers is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum PrecisionTier {
    /// fp32
    #[serde(alias = "wide", alias = "fp32", alias = "WIDE")]
    Wide,
    /// fp16
    #[serde(alias = "narrow", alias = "fp16", alias = "NARROW")]
    Narrow,
    /// bfloat16
    #[serde(alias = "bfloat16", alias = "bf16", alias = "BF16")]
    BFloat16,
}

/// Nominal resource characteristics of a precision tier, relative to Wide
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierCharacteristics {
    /// Estimated power saved versus Wide, in percent
    pub power_saved_percent: f64,

    /// Estimated memory saved versus Wide, in percent
    pub memory_saved_percent: f64,

    /// Throughput multiplier versus Wide
    pub relative_speed: f64,
}

impl PrecisionTier {
    /// Bits per floating-point element
    pub fn bits(&self) -> u32 {
        match self {
            PrecisionTier::Wide => 32,
            PrecisionTier::Narrow | PrecisionTier::BFloat16 => 16,
        }
    }

    /// Whether this is the safety tier
    pub fn is_wide(&self) -> bool {
        matches!(self, PrecisionTier::Wide)
    }

    /// Nominal savings of this tier
    pub fn characteristics(&self) -> TierCharacteristics {
        match self {
            PrecisionTier::Wide => TierCharacteristics {
                power_saved_percent: 0.0,
                memory_saved_percent: 0.0,
                relative_speed: 1.0,
            },
            PrecisionTier::Narrow => TierCharacteristics {
                power_saved_percent: 45.0,
                memory_saved_percent: 50.0,
                relative_speed: 1.5,
            },
            PrecisionTier::BFloat16 => TierCharacteristics {
                power_saved_percent: 40.0,
                memory_saved_percent: 50.0,
                relative_speed: 1.4,
            },
        }
    }
}

impl Default for PrecisionTier {
    fn default() -> Self {
        PrecisionTier::Wide
    }
}

impl std::str::FromStr for PrecisionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "wide" | "fp32" | "float32" => Ok(PrecisionTier::Wide),
            "narrow" | "fp16" | "float16" | "half" => Ok(PrecisionTier::Narrow),
            "bfloat16" | "bf16" => Ok(PrecisionTier::BFloat16),
            _ => Err(format!("Unknown precision tier: {}", s)),
        }
    }
}

impl fmt::Display for PrecisionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrecisionTier::Wide => write!(f, "Wide"),
            PrecisionTier::Narrow => write!(f, "Narrow"),
            PrecisionTier::BFloat16 => write!(f, "BFloat16"),
        }
    }
}

/// Compute data type selected for the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDtype {
    F32,
    F16,
    BF16,
}

/// Runtime flags implied by a precision tier.
///
/// The only constructor is [`OptimizationProfile::for_tier`], so no flag
/// combination exists outside the tier mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct OptimizationProfile {
    tier: PrecisionTier,
    compute_dtype: ComputeDtype,
    autocast: bool,
    kernel_fusion: bool,
    cudnn_benchmark: bool,
    tf32_matmul: bool,
}

impl OptimizationProfile {
    /// Build the profile for a tier
    pub fn for_tier(tier: PrecisionTier) -> Self {
        match tier {
            PrecisionTier::Wide => Self {
                tier,
                compute_dtype: ComputeDtype::F32,
                autocast: false,
                kernel_fusion: true,
                cudnn_benchmark: true,
                tf32_matmul: false,
            },
            PrecisionTier::Narrow => Self {
                tier,
                compute_dtype: ComputeDtype::F16,
                autocast: true,
                kernel_fusion: true,
                cudnn_benchmark: true,
                tf32_matmul: false,
            },
            PrecisionTier::BFloat16 => Self {
                tier,
                compute_dtype: ComputeDtype::BF16,
                autocast: true,
                kernel_fusion: true,
                cudnn_benchmark: true,
                tf32_matmul: false,
            },
        }
    }

    pub fn tier(&self) -> PrecisionTier {
        self.tier
    }

    pub fn compute_dtype(&self) -> ComputeDtype {
        self.compute_dtype
    }

    /// Mixed-precision autocast enabled
    pub fn autocast(&self) -> bool {
        self.autocast
    }

    /// Fused kernels enabled
    pub fn kernel_fusion(&self) -> bool {
        self.kernel_fusion
    }

    /// cuDNN-style autotuning enabled
    pub fn cudnn_benchmark(&self) -> bool {
        self.cudnn_benchmark
    }

    /// TF32 tensor-core matmul allowed
    pub fn tf32_matmul(&self) -> bool {
        self.tf32_matmul
    }
}

impl fmt::Display for OptimizationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (dtype={:?}, autocast={}, fusion={}, benchmark={})",
            self.tier, self.compute_dtype, self.autocast, self.kernel_fusion, self.cudnn_benchmark
        )
    }
}
