//! JSON report for one measurement run
//!
//! The measurement child prints this document on stdout; the parent parses it
//! back and optionally persists it as an artifact.

use crate::invocation::OperationKind;
use crate::params::ParamSet;
use crate::stats::SampleStats;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const REPORT_FORMAT: &str = "fsprobe-json-v1";

/// Root JSON output structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementReport {
    /// Format version identifier
    pub version: String,
    /// Format name
    pub format: String,
    pub operation: OperationKind,
    /// Parameters the run was launched with
    pub parameters: ParamSet,
    pub warmup_iterations: u32,
    pub measurement_iterations: u32,
    /// Per-iteration wall time in microseconds
    pub samples_us: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SampleStats>,
}

impl MeasurementReport {
    pub fn new(operation: OperationKind, parameters: ParamSet) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: REPORT_FORMAT.to_string(),
            operation,
            parameters,
            warmup_iterations: 0,
            measurement_iterations: 0,
            samples_us: Vec::new(),
            summary: None,
        }
    }

    /// Record one timed iteration
    pub fn add_sample(&mut self, duration_us: u64) {
        self.samples_us.push(duration_us);
        self.measurement_iterations += 1;
    }

    /// Recompute the summary from the recorded samples
    pub fn finish(&mut self) {
        self.summary = SampleStats::from_samples(&self.samples_us);
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Write the report as `<dir>/<operation>-<unix millis>.json`
    pub fn write_to_dir(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let path = dir.join(format!("{}-{}.json", self.operation, millis));
        let json = self.to_json().map_err(std::io::Error::from)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}
