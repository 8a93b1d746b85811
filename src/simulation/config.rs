//! Simulation configuration
//!
//! Every tunable of the kernel lives in [`SimConfig`]. It can be loaded from
//! a JSON file; missing fields fall back to their defaults.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use super::metrics::MetricsParams;
use super::path::JunctionGeometry;
use super::population::SpawnPolicy;
use super::signal::{AdaptivePolicy, SignalTimings};
use super::types::{Direction, TurnIntent};
use super::vehicle::KinematicsParams;

/// Frame clamping for [`super::SimWorld::step`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteppingParams {
    /// Longest sub-step the kinematics integrate over, in seconds
    pub max_substep: f32,
    /// Frames longer than this are truncated
    pub max_frame_dt: f32,
}

impl Default for SteppingParams {
    fn default() -> Self {
        Self {
            max_substep: 1.0 / 60.0,
            max_frame_dt: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub geometry: JunctionGeometry,
    /// Default signal timing, restored on reset
    pub signal: SignalTimings,
    pub adaptive: AdaptivePolicy,
    /// Re-time the greens from queue lengths at the start of every cycle
    pub adaptive_signals: bool,
    pub roundabout: bool,
    pub spawn: SpawnPolicy,
    pub kinematics: KinematicsParams,
    pub stepping: SteppingParams,
    pub metrics: MetricsParams,
    /// Seed for reproducible runs; thread RNG when absent
    pub seed: Option<u64>,
}

impl SimConfig {
    /// Load a configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: SimConfig = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the kernel cannot run with
    pub fn validate(&self) -> Result<()> {
        self.signal.validate().context("invalid signal timings")?;

        let path = self
            .geometry
            .generate_path(Direction::North, TurnIntent::Straight, self.roundabout);
        if path.is_empty() {
            bail!("junction geometry does not produce any path");
        }

        let stepping = &self.stepping;
        if !(stepping.max_substep > 0.0) || !(stepping.max_frame_dt > 0.0) {
            bail!("stepping limits must be positive");
        }

        let spawn = &self.spawn;
        if !(spawn.normal_interval >= 0.0) || !(spawn.demo_interval >= 0.0) {
            bail!("spawn intervals must not be negative");
        }
        if spawn.turn_weights.pick(0.0).is_none() {
            bail!("turn weights must have a positive total");
        }
        if spawn.class_weights.pick(0.0).is_none() {
            bail!("vehicle class weights must have a positive total");
        }
        if let Some(window) = spawn.baseline_delay {
            if !(window.min >= 0.0) || !(window.max >= window.min) {
                bail!("baseline delay window must satisfy 0 <= min <= max");
            }
        }

        let k = &self.kinematics;
        if !(k.wait_decay_tau > 0.0) || !(k.waypoint_epsilon > 0.0) {
            bail!("wait decay and waypoint epsilon must be positive");
        }
        if !(k.signal_lookahead >= 0.0) || !(k.obstruction_lookahead >= 0.0) {
            bail!("lookahead distances must not be negative");
        }
        if !(0.0..=1.0).contains(&k.target_smoothing) {
            bail!("target smoothing must be within [0, 1]");
        }

        let adaptive = &self.adaptive;
        if !(adaptive.min_green > 0.0) || !(adaptive.max_green >= adaptive.min_green) {
            bail!("adaptive green bounds must satisfy 0 < min <= max");
        }
        Ok(())
    }
}
