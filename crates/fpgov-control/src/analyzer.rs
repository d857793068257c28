//! Workload complexity scoring

use fpgov_core::{AnalyzerConfig, ComplexityScore, DataTypeHint, Result, WorkloadDescriptor};

/// Maps workload descriptors to a normalized complexity score.
///
/// The size proxy (elements x batch) is scaled logarithmically against the
/// configured saturation size, then weighted by operation kind:
///
/// ```text
/// size_factor = min(1, ln(1 + total) / ln(1 + saturation_elements))
/// score       = clamp(weight(op) * size_factor + float64_bias?, 0, 1)
/// ```
///
/// The analyzer holds no mutable state and never looks at telemetry, so the
/// same descriptor always produces the same score.
#[derive(Debug, Clone)]
pub struct ComplexityAnalyzer {
    config: AnalyzerConfig,
    saturation_ln: f64,
}

impl ComplexityAnalyzer {
    /// Create an analyzer from validated configuration
    pub fn new(config: AnalyzerConfig) -> Self {
        let saturation_ln = (config.saturation_elements as f64).ln_1p();
        Self {
            config,
            saturation_ln,
        }
    }

    /// Score a workload. Fails only for malformed descriptors.
    pub fn score(&self, descriptor: &WorkloadDescriptor) -> Result<ComplexityScore> {
        descriptor.validate()?;

        let size_factor = self.size_factor(descriptor.total_elements());
        let weight = self.config.op_weights.weight(descriptor.operation);

        let mut raw = weight * size_factor;
        if descriptor.dtype_hint == DataTypeHint::Float64 {
            raw += self.config.float64_bias;
        }

        Ok(ComplexityScore::new(raw))
    }

    /// Logarithmic size proxy in `[0, 1]`
    pub fn size_factor(&self, total_elements: u64) -> f64 {
        if self.saturation_ln <= 0.0 {
            return 1.0;
        }
        ((total_elements as f64).ln_1p() / self.saturation_ln).clamp(0.0, 1.0)
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }
}

impl Default for ComplexityAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}
