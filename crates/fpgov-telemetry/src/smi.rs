//! `nvidia-smi` telemetry backend
//!
//! Each read spawns one `nvidia-smi --query-gpu` process and parses its single
//! CSV line. The child is killed if the read future is dropped, so the
//! sampler's timeout also bounds the subprocess.

use fpgov_core::{TelemetryError, TelemetrySample, TelemetrySource};

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Fields queried from the device, in output order
pub const QUERY_FIELDS: &str =
    "utilization.gpu,power.draw,clocks.current.graphics,memory.used";

/// Telemetry source backed by the `nvidia-smi` command line tool
pub struct SmiTelemetrySource {
    binary: PathBuf,
    gpu_index: u32,
}

impl SmiTelemetrySource {
    /// Create a new `nvidia-smi` source
    pub fn new(binary: impl Into<PathBuf>, gpu_index: u32) -> Self {
        let binary = binary.into();
        info!("Creating nvidia-smi telemetry source ({}, gpu {})", binary.display(), gpu_index);
        Self { binary, gpu_index }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(format!("--query-gpu={}", QUERY_FIELDS))
            .arg("--format=csv,noheader,nounits")
            .arg("-i")
            .arg(self.gpu_index.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl TelemetrySource for SmiTelemetrySource {
    async fn sample(&self) -> Result<TelemetrySample, TelemetryError> {
        let output = self.command().output().await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                TelemetryError::Unavailable(format!("{} not found", self.binary.display()))
            }
            ErrorKind::PermissionDenied => {
                TelemetryError::Unavailable(format!("permission denied running {}", self.binary.display()))
            }
            _ => TelemetryError::Unavailable(e.to_string()),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TelemetryError::Unavailable(format!(
                "nvidia-smi exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| TelemetryError::Malformed("empty nvidia-smi output".to_string()))?;

        debug!("nvidia-smi gpu {}: {}", self.gpu_index, line);
        parse_smi_line(line)
    }

    fn name(&self) -> &str {
        "nvidia-smi"
    }
}

/// Parse one `utilization, power, clock, memory` line as printed by
/// `nvidia-smi --format=csv,noheader,nounits`
pub fn parse_smi_line(line: &str) -> Result<TelemetrySample, TelemetryError> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(TelemetryError::Malformed(format!(
            "expected 4 fields, got {}: {:?}",
            fields.len(),
            line
        )));
    }

    let utilization: f64 = parse_field("utilization.gpu", fields[0])?;
    let power: f64 = parse_field("power.draw", fields[1])?;
    let clock: f64 = parse_field("clocks.current.graphics", fields[2])?;
    let memory: f64 = parse_field("memory.used", fields[3])?;

    Ok(TelemetrySample::new(
        utilization,
        power,
        clock.max(0.0).round() as u32,
        memory.max(0.0).round() as u64,
    ))
}

fn parse_field(name: &str, raw: &str) -> Result<f64, TelemetryError> {
    if raw.is_empty() || raw.starts_with('[') {
        // "[N/A]", "[Not Supported]"
        return Err(TelemetryError::Malformed(format!("{} not reported ({})", name, raw)));
    }

    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(TelemetryError::Malformed(format!("invalid {}: {:?}", name, raw))),
    }
}
