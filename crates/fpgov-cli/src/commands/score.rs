//! `fpgov score`

use crate::output::{Formattable, OutputFormatter};
use anyhow::{Context, Result};
use fpgov_control::{ComplexityAnalyzer, PromptAnalyzer, PromptEstimate, WorkloadParams, WorkloadType};
use fpgov_core::{GovernorConfig, PrecisionTier, WorkloadDescriptor};
use serde::Serialize;

/// Longest prompt excerpt shown in reports
const PROMPT_EXCERPT_CHARS: usize = 60;

/// What to score
#[derive(Debug, Clone)]
pub enum ScoreInput {
    Workload(WorkloadDescriptor),
    Prompt(String),
    WorkloadType(WorkloadType, WorkloadParams),
}

impl ScoreInput {
    fn kind(&self) -> &'static str {
        match self {
            ScoreInput::Workload(_) => "workload",
            ScoreInput::Prompt(_) => "prompt",
            ScoreInput::WorkloadType(..) => "workload_type",
        }
    }

    fn subject(&self) -> String {
        match self {
            ScoreInput::Workload(descriptor) => format!(
                "{} {} elements x{} ({})",
                descriptor.operation,
                descriptor.element_count,
                descriptor.batch_size,
                descriptor.dtype_hint
            ),
            ScoreInput::Prompt(prompt) => {
                let mut excerpt: String = prompt.chars().take(PROMPT_EXCERPT_CHARS).collect();
                if prompt.chars().count() > PROMPT_EXCERPT_CHARS {
                    excerpt.push_str("...");
                }
                excerpt
            }
            ScoreInput::WorkloadType(workload_type, _) => workload_type.to_string(),
        }
    }
}

/// Score of one input and what the configured thresholds make of it
#[derive(Debug, Clone, Serialize)]
pub struct ScoreReport {
    pub input: String,
    pub subject: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptEstimate>,
    pub low_threshold: f64,
    pub high_threshold: f64,
    /// `None` inside the hysteresis band, where the current tier is kept
    pub implied_tier: Option<PrecisionTier>,
}

impl ScoreReport {
    pub fn new(input: &ScoreInput, score: f64, config: &GovernorConfig) -> Self {
        let implied_tier = if score < config.low_threshold {
            Some(config.efficient_tier)
        } else if score > config.high_threshold {
            Some(PrecisionTier::Wide)
        } else {
            None
        };

        Self {
            input: input.kind().to_string(),
            subject: input.subject(),
            score,
            prompt: None,
            low_threshold: config.low_threshold,
            high_threshold: config.high_threshold,
            implied_tier,
        }
    }

    fn verdict(&self) -> String {
        match self.implied_tier {
            Some(tier) => tier.to_string(),
            None => "hold current tier".to_string(),
        }
    }
}

impl Formattable for ScoreReport {
    fn table_headers() -> Vec<String> {
        vec![
            "Input".to_string(),
            "Subject".to_string(),
            "Score".to_string(),
            "Tier".to_string(),
        ]
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.input.clone(),
            self.subject.clone(),
            format!("{:.4}", self.score),
            self.verdict(),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("Input".to_string(), self.input.clone()),
            ("Subject".to_string(), self.subject.clone()),
        ];
        if let Some(estimate) = &self.prompt {
            pairs.extend([
                (
                    "Operation Factor".to_string(),
                    format!("{:.2}", estimate.operation_factor),
                ),
                ("Size Factor".to_string(), format!("{:.2}", estimate.size_factor)),
                ("Token Factor".to_string(), format!("{:.4}", estimate.token_factor)),
                ("Tokens".to_string(), estimate.tokens.to_string()),
            ]);
        }
        pairs.extend([
            ("Score".to_string(), format!("{:.4}", self.score)),
            (
                "Thresholds".to_string(),
                format!("{:.2} / {:.2}", self.low_threshold, self.high_threshold),
            ),
            ("Tier".to_string(), self.verdict()),
        ]);
        pairs
    }
}

/// Score an input without starting a governor
pub fn evaluate(config: &GovernorConfig, input: &ScoreInput) -> Result<ScoreReport> {
    match input {
        ScoreInput::Workload(descriptor) => {
            let analyzer = ComplexityAnalyzer::new(config.analyzer.clone());
            let score = analyzer
                .score(descriptor)
                .with_context(|| format!("Cannot score {} workload", descriptor.operation))?;
            Ok(ScoreReport::new(input, score.value(), config))
        }
        ScoreInput::Prompt(prompt) => {
            let estimate = PromptAnalyzer::new()?
                .estimate(prompt)
                .context("Cannot score prompt")?;
            let mut report = ScoreReport::new(input, estimate.score.value(), config);
            report.prompt = Some(estimate);
            Ok(report)
        }
        ScoreInput::WorkloadType(workload_type, params) => Ok(ScoreReport::new(
            input,
            workload_type.score(params).value(),
            config,
        )),
    }
}

pub fn score_workload(
    config: &GovernorConfig,
    input: &ScoreInput,
    formatter: &OutputFormatter,
) -> Result<()> {
    formatter.print_item(&evaluate(config, input)?)
}
