//! Command implementations

pub mod collect;
pub mod config;
pub mod score;
pub mod simulate;

use anyhow::{Context, Result};
use fpgov_core::GovernorConfig;
use std::path::Path;

/// Load the governor configuration from an explicit file, or from the
/// environment and `./fpgov.yaml`
pub fn load_config(path: Option<&Path>) -> Result<GovernorConfig> {
    match path {
        Some(path) => GovernorConfig::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => GovernorConfig::load().context("Failed to load configuration"),
    }
}
