//! Key-value export of the latest metrics
//!
//! Written for dashboards and reports; nothing reads it back.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

use super::metrics::MetricsSnapshot;
use super::obstruction::Obstruction;
use super::population::SpawnMode;
use super::signal::{SignalPhase, SignalTimings};

#[derive(Debug, Clone, Serialize)]
pub struct SignalExport {
    pub phase: SignalPhase,
    pub countdown: f32,
    pub timings: SignalTimings,
    pub cycles: u64,
}

/// Everything a report needs about one moment of the simulation
#[derive(Debug, Clone, Serialize)]
pub struct MetricsExport {
    pub layout: &'static str,
    pub spawn_mode: SpawnMode,
    pub metrics: MetricsSnapshot,
    pub obstruction_count: usize,
    pub obstructions: Vec<Obstruction>,
    /// Absent for a roundabout
    pub signal: Option<SignalExport>,
}

impl MetricsExport {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize metrics export")
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        fs::write(path, json)
            .with_context(|| format!("failed to write metrics export to {}", path.display()))
    }
}
