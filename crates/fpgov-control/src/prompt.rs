//! Complexity estimates for free-text prompts and named AI workload types
//!
//! These are front-ends for hosts that cannot describe a workload as an
//! operation and a size. Both produce a [`ComplexityScore`] in `[0, 1]` that
//! goes through the same decision path as descriptor scores.

use fpgov_core::{ComplexityScore, Error, Result};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Keyword patterns and the operation factor each one implies. The highest
/// matching weight wins.
const OPERATION_KEYWORDS: [(&str, f64); 11] = [
    (r"\btrain\b", 0.9),
    (r"\bbackprop\b", 0.95),
    (r"\bconvolution\b", 0.8),
    (r"\bfft\b", 0.7),
    (r"\brender\b", 0.9),
    (r"\bray[- ]trace\b", 1.0),
    (r"\binference\b", 0.5),
    (r"\bsimulat", 0.8),
    (r"\boptimi[sz]e\b", 0.6),
    (r"\badd\b", 0.05),
    (r"\bmean\b", 0.05),
];

const OPERATION_WEIGHT: f64 = 0.5;
const SIZE_WEIGHT: f64 = 0.35;
const TOKEN_WEIGHT: f64 = 0.15;

/// Token count at which the context-length factor saturates
const TOKEN_SATURATION: f64 = 2000.0;
const MATRIX_AREA_BASE: f64 = 4096.0;
const BATCH_BASE: f64 = 256.0;
const LOG_INPUT_CAP: f64 = 1e12;

/// Breakdown of a prompt estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PromptEstimate {
    pub score: ComplexityScore,
    /// Strongest operation keyword weight, 0 when none matched
    pub operation_factor: f64,
    /// Largest of the matrix-area and batch-size factors
    pub size_factor: f64,
    pub token_factor: f64,
    pub tokens: usize,
}

/// Scores prompt text from operation keywords, `NxM` sizes, batch sizes and
/// length:
///
/// ```text
/// score = clamp(0.5 * op + 0.35 * max(matrix, batch) + 0.15 * min(1, tokens / 2000), 0, 1)
/// ```
#[derive(Debug, Clone)]
pub struct PromptAnalyzer {
    keywords: Vec<(Regex, f64)>,
    token: Regex,
    matrix: Regex,
    batch: Regex,
}

impl PromptAnalyzer {
    pub fn new() -> Result<Self> {
        let keywords = OPERATION_KEYWORDS
            .iter()
            .map(|(pattern, weight)| Ok((compile(pattern)?, *weight)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            keywords,
            token: compile(r"\w+")?,
            matrix: compile(r"(\d{1,6})\s*[x×]\s*(\d{1,6})")?,
            batch: compile(r"(?:batch\s*size|bs)\s*[:=]?\s*(\d{1,6})")?,
        })
    }

    /// Estimate a prompt. Blank prompts are rejected like malformed
    /// descriptors.
    pub fn estimate(&self, prompt: &str) -> Result<PromptEstimate> {
        if prompt.trim().is_empty() {
            return Err(Error::InvalidWorkload("prompt is empty".to_string()));
        }
        let text = prompt.to_lowercase();

        let tokens = self.token.find_iter(&text).count();
        let token_factor = (tokens as f64 / TOKEN_SATURATION).min(1.0);

        let matrix_factor = self
            .matrix
            .captures_iter(&text)
            .filter_map(|caps| {
                let rows: f64 = caps.get(1)?.as_str().parse().ok()?;
                let cols: f64 = caps.get(2)?.as_str().parse().ok()?;
                Some(log_factor(rows * cols, MATRIX_AREA_BASE))
            })
            .fold(0.0, f64::max);

        let batch_factor = self
            .batch
            .captures(&text)
            .and_then(|caps| caps.get(1)?.as_str().parse::<f64>().ok())
            .map_or(0.0, |batch| log_factor(batch, BATCH_BASE));

        let size_factor = matrix_factor.max(batch_factor);

        let operation_factor = self
            .keywords
            .iter()
            .filter(|(pattern, _)| pattern.is_match(&text))
            .map(|(_, weight)| *weight)
            .fold(0.0, f64::max);

        let raw = OPERATION_WEIGHT * operation_factor
            + SIZE_WEIGHT * size_factor
            + TOKEN_WEIGHT * token_factor;

        Ok(PromptEstimate {
            score: ComplexityScore::new(raw),
            operation_factor,
            size_factor,
            token_factor,
            tokens,
        })
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::governor(format!("invalid prompt pattern {}: {}", pattern, e)))
}

/// `min(1, ln(1 + x) / ln(1 + base))` with `x` capped
fn log_factor(value: f64, base: f64) -> f64 {
    let value = value.clamp(0.0, LOG_INPUT_CAP);
    (value.ln_1p() / base.ln_1p()).min(1.0)
}

/// Named AI workload categories with a fixed base complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadType {
    TextGeneration,
    ImageGeneration,
    ModelTraining,
    FineTuning,
    Inference,
    Embedding,
    Translation,
    Summarization,
    QuestionAnswering,
    Classification,
}

impl WorkloadType {
    pub const ALL: [WorkloadType; 10] = [
        WorkloadType::TextGeneration,
        WorkloadType::ImageGeneration,
        WorkloadType::ModelTraining,
        WorkloadType::FineTuning,
        WorkloadType::Inference,
        WorkloadType::Embedding,
        WorkloadType::Translation,
        WorkloadType::Summarization,
        WorkloadType::QuestionAnswering,
        WorkloadType::Classification,
    ];

    pub fn base_complexity(&self) -> f64 {
        match self {
            WorkloadType::TextGeneration => 0.4,
            WorkloadType::ImageGeneration => 0.7,
            WorkloadType::ModelTraining => 0.9,
            WorkloadType::FineTuning => 0.8,
            WorkloadType::Inference => 0.3,
            WorkloadType::Embedding => 0.5,
            WorkloadType::Translation => 0.4,
            WorkloadType::Summarization => 0.3,
            WorkloadType::QuestionAnswering => 0.4,
            WorkloadType::Classification => 0.3,
        }
    }

    /// Base complexity raised by large batches, long sequences and large
    /// images, capped at 1
    pub fn score(&self, params: &WorkloadParams) -> ComplexityScore {
        let mut raw = self.base_complexity();
        if params.batch_size.map_or(false, |batch| batch > 8) {
            raw += 0.1;
        }
        if params.sequence_length.map_or(false, |len| len > 512) {
            raw += 0.1;
        }
        if params.image_size.map_or(false, |size| size > 512) {
            raw += 0.2;
        }
        ComplexityScore::new(raw)
    }
}

impl std::str::FromStr for WorkloadType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        WorkloadType::ALL
            .into_iter()
            .find(|ty| ty.to_string() == normalized)
            .ok_or_else(|| format!("Unknown workload type: {}", s))
    }
}

impl fmt::Display for WorkloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkloadType::TextGeneration => "text_generation",
            WorkloadType::ImageGeneration => "image_generation",
            WorkloadType::ModelTraining => "model_training",
            WorkloadType::FineTuning => "fine_tuning",
            WorkloadType::Inference => "inference",
            WorkloadType::Embedding => "embedding",
            WorkloadType::Translation => "translation",
            WorkloadType::Summarization => "summarization",
            WorkloadType::QuestionAnswering => "question_answering",
            WorkloadType::Classification => "classification",
        };
        f.write_str(name)
    }
}

/// Optional shape parameters of a typed workload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadParams {
    pub batch_size: Option<u64>,
    pub sequence_length: Option<u64>,
    pub image_size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> PromptAnalyzer {
        PromptAnalyzer::new().unwrap()
    }

    #[test]
    fn test_trivial_prompt_scores_low() {
        let estimate = analyzer().estimate("add two numbers").unwrap();
        assert!((estimate.operation_factor - 0.05).abs() < 1e-9);
        assert_eq!(estimate.size_factor, 0.0);
        assert_eq!(estimate.tokens, 3);
        assert!(estimate.score.value() < 0.05, "score was {}", estimate.score);
    }

    #[test]
    fn test_training_on_large_matrices_scores_high() {
        let estimate = analyzer()
            .estimate("Train a network on 4096x4096 matrices with batch size: 256")
            .unwrap();
        assert!((estimate.operation_factor - 0.9).abs() < 1e-9);
        assert!((estimate.size_factor - 1.0).abs() < 1e-9);
        assert!(estimate.score.value() > 0.8, "score was {}", estimate.score);
    }

    #[test]
    fn test_strongest_keyword_wins() {
        let estimate = analyzer()
            .estimate("compute the mean, then ray-trace the scene")
            .unwrap();
        assert_eq!(estimate.operation_factor, 1.0);
    }

    #[test]
    fn test_matrix_dimensions_accept_spacing_and_multiplication_sign() {
        let analyzer = analyzer();
        let spaced = analyzer.estimate("multiply 512 x 512").unwrap();
        let sign = analyzer.estimate("multiply 512×512").unwrap();
        assert!(spaced.size_factor > 0.0);
        assert_eq!(spaced.size_factor, sign.size_factor);
    }

    #[test]
    fn test_batch_size_counts_toward_size() {
        let estimate = analyzer().estimate("run inference bs=256").unwrap();
        assert!((estimate.size_factor - 1.0).abs() < 1e-9);

        let small = analyzer().estimate("run inference bs=4").unwrap();
        assert!(small.size_factor < estimate.size_factor);
    }

    #[test]
    fn test_long_prompt_saturates_token_factor() {
        let prompt = "word ".repeat(5_000);
        let estimate = analyzer().estimate(&prompt).unwrap();
        assert_eq!(estimate.token_factor, 1.0);
        assert!(estimate.score.value() <= 1.0);
    }

    #[test]
    fn test_blank_prompt_rejected() {
        assert!(matches!(
            analyzer().estimate("   \n"),
            Err(Error::InvalidWorkload(_))
        ));
    }

    #[test]
    fn test_scores_stay_in_unit_range() {
        let analyzer = analyzer();
        for prompt in [
            "train backprop render ray trace simulate 999999x999999 batch size 999999",
            "x",
            "0x0",
        ] {
            let value = analyzer.estimate(prompt).unwrap().score.value();
            assert!((0.0..=1.0).contains(&value), "{} scored {}", prompt, value);
        }
    }

    #[test]
    fn test_workload_type_parameter_bumps() {
        let plain = WorkloadType::Inference.score(&WorkloadParams::default());
        assert!((plain.value() - 0.3).abs() < 1e-9);

        let params = WorkloadParams {
            batch_size: Some(32),
            sequence_length: Some(1024),
            image_size: None,
        };
        let bumped = WorkloadType::Inference.score(&params);
        assert!((bumped.value() - 0.5).abs() < 1e-9);

        let capped = WorkloadType::ModelTraining.score(&WorkloadParams {
            batch_size: Some(64),
            sequence_length: Some(2048),
            image_size: Some(1024),
        });
        assert_eq!(capped, ComplexityScore::MAX);
    }

    #[test]
    fn test_bumps_need_strictly_larger_values() {
        let params = WorkloadParams {
            batch_size: Some(8),
            sequence_length: Some(512),
            image_size: Some(512),
        };
        let score = WorkloadType::Embedding.score(&params);
        assert!((score.value() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_workload_type_names() {
        for ty in WorkloadType::ALL {
            assert_eq!(ty.to_string().parse::<WorkloadType>().unwrap(), ty);
        }
        assert_eq!(
            "fine-tuning".parse::<WorkloadType>().unwrap(),
            WorkloadType::FineTuning
        );
        assert!("rendering".parse::<WorkloadType>().is_err());
    }
}
