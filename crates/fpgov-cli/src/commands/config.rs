//! `fpgov config` and `fpgov validate`

use crate::output::{Formattable, OutputFormat, OutputFormatter};
use anyhow::{Context, Result};
use fpgov_core::GovernorConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Print the default configuration, or write it to `output`
pub fn show_default(output: Option<&Path>, formatter: &OutputFormatter) -> Result<()> {
    let config = GovernorConfig::default();

    match output {
        Some(path) => {
            std::fs::write(path, config.to_yaml()?)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            formatter.print_success(&format!("Default configuration written to {}", path.display()))
        }
        None => match formatter.format() {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&config)?);
                Ok(())
            }
            _ => {
                print!("{}", config.to_yaml()?);
                Ok(())
            }
        },
    }
}

/// Key settings of a configuration that passed validation
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub path: PathBuf,
    pub valid: bool,
    pub low_threshold: f64,
    pub high_threshold: f64,
    pub cooldown_ms: u64,
    pub sample_interval_ms: u64,
    pub default_tier: String,
    pub efficient_tier: String,
}

impl ValidationReport {
    fn new(path: &Path, config: &GovernorConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            valid: true,
            low_threshold: config.low_threshold,
            high_threshold: config.high_threshold,
            cooldown_ms: config.cooldown_ms,
            sample_interval_ms: config.sample_interval_ms,
            default_tier: config.default_tier.to_string(),
            efficient_tier: config.efficient_tier.to_string(),
        }
    }
}

impl Formattable for ValidationReport {
    fn table_headers() -> Vec<String> {
        vec!["File".to_string(), "Valid".to_string()]
    }

    fn table_row(&self) -> Vec<String> {
        vec![self.path.display().to_string(), self.valid.to_string()]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        vec![
            (
                "Thresholds".to_string(),
                format!("{:.2} / {:.2}", self.low_threshold, self.high_threshold),
            ),
            ("Cooldown".to_string(), format!("{}ms", self.cooldown_ms)),
            (
                "Sample Interval".to_string(),
                format!("{}ms", self.sample_interval_ms),
            ),
            ("Default Tier".to_string(), self.default_tier.clone()),
            ("Efficient Tier".to_string(), self.efficient_tier.clone()),
        ]
    }
}

/// Load and validate a configuration file
pub fn validate(path: &Path, formatter: &OutputFormatter) -> Result<()> {
    let config = GovernorConfig::load_from_file(path)
        .with_context(|| format!("Configuration {} is invalid", path.display()))?;

    let report = ValidationReport::new(path, &config);
    if matches!(formatter.format(), OutputFormat::Table | OutputFormat::Text) {
        formatter.print_success(&format!("Configuration {} is valid", path.display()))?;
    }
    formatter.print_item(&report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatter() -> OutputFormatter {
        OutputFormatter::new(OutputFormat::Json)
    }

    #[test]
    fn test_written_default_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fpgov.yaml");

        show_default(Some(path.as_path()), &formatter()).unwrap();
        assert!(path.exists());
        validate(&path, &formatter()).unwrap();

        let loaded = GovernorConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded, GovernorConfig::default());
    }

    #[test]
    fn test_inverted_thresholds_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "low_threshold: 0.8\nhigh_threshold: 0.2\n").unwrap();

        let err = validate(&path, &formatter()).unwrap_err();
        assert!(err.to_string().contains("is invalid"));
    }

    #[test]
    fn test_missing_file_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate(&dir.path().join("absent.yaml"), &formatter()).is_err());
    }
}
