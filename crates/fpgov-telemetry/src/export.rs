//! Append-only CSV export of telemetry samples

use crate::ExportError;
use fpgov_core::{PrecisionTier, TelemetrySample};

use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Column header written at the top of every telemetry file
pub const CSV_HEADER: [&str; 6] = [
    "timestamp",
    "utilization_pct",
    "power_watts",
    "clock_mhz",
    "memory_used_mib",
    "active_tier",
];

#[derive(Serialize)]
struct CsvRow {
    timestamp: String,
    utilization_pct: f64,
    power_watts: f64,
    clock_mhz: u32,
    memory_used_mib: u64,
    active_tier: String,
}

/// Writes one row per sample, tagged with the tier in effect when it was taken
pub struct TelemetryCsvWriter {
    writer: csv::Writer<File>,
    path: PathBuf,
    rows: u64,
}

impl TelemetryCsvWriter {
    /// Open `path` for appending. The header is written only when the file is
    /// new or empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExportError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_empty = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_empty {
            writer.write_record(CSV_HEADER)?;
            writer.flush()?;
        }

        debug!("Opened telemetry CSV {}", path.display());
        Ok(Self {
            writer,
            path,
            rows: 0,
        })
    }

    /// Append a sample and flush it to disk
    pub fn append(&mut self, sample: &TelemetrySample, tier: PrecisionTier) -> Result<(), ExportError> {
        self.writer.serialize(CsvRow {
            timestamp: sample.timestamp.to_rfc3339(),
            utilization_pct: sample.utilization_pct,
            power_watts: sample.power_watts,
            clock_mhz: sample.clock_mhz,
            memory_used_mib: sample.memory_used_mib,
            active_tier: tier.to_string(),
        })?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written through this writer
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
