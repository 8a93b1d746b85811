//! Main simulation world that ties everything together
//!
//! `SimWorld` owns all simulation state. A driver calls [`SimWorld::step`]
//! once per frame with the elapsed time, reads the query surface, and issues
//! commands in between.

use anyhow::Result;
use log::{debug, info, warn};
use std::path::Path;

use super::config::SimConfig;
use super::export::{MetricsExport, SignalExport};
use super::metrics::{self, MetricsHistory, MetricsSnapshot, QueueLengths};
use super::obstruction::{Obstruction, ObstructionField, ObstructionKind, PlacementError};
use super::population::{PopulationManager, PopulationTotals, SpawnContext, SpawnMode};
use super::signal::{SignalController, SignalPhase, SignalTimings};
use super::types::{Direction, ObstructionId, Position, TurnIntent, VehicleClass, VehicleId};
use super::vehicle::{AdvanceContext, SimVehicle};

/// The main simulation world
pub struct SimWorld {
    config: SimConfig,

    /// Live vehicles, replaced wholesale every tick
    vehicles: Vec<SimVehicle>,

    obstructions: ObstructionField,

    signal: SignalController,

    population: PopulationManager,

    /// Snapshot taken at the end of the last step
    metrics: MetricsSnapshot,

    history: MetricsHistory,

    /// Simulation time
    time: f32,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl SimWorld {
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    /// Create a new SimWorld with a seeded RNG for reproducible simulations
    pub fn new_with_seed(seed: u64) -> Self {
        Self::with_config(SimConfig {
            seed: Some(seed),
            ..SimConfig::default()
        })
    }

    pub fn with_config(config: SimConfig) -> Self {
        if let Err(e) = config.validate() {
            warn!("Running with questionable configuration: {:#}", e);
        }
        Self {
            vehicles: Vec::new(),
            obstructions: ObstructionField::new(config.geometry),
            signal: SignalController::new(config.signal),
            population: PopulationManager::new(config.spawn.clone(), config.seed),
            metrics: MetricsSnapshot::default(),
            history: MetricsHistory::new(config.metrics.history_capacity),
            time: 0.0,
            config,
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn vehicles(&self) -> &[SimVehicle] {
        &self.vehicles
    }

    pub fn vehicle(&self, id: VehicleId) -> Option<&SimVehicle> {
        self.vehicles.iter().find(|v| v.id == id)
    }

    pub fn obstructions(&self) -> &ObstructionField {
        &self.obstructions
    }

    /// The signal controller, or `None` when a roundabout replaces it
    pub fn signal(&self) -> Option<&SignalController> {
        (!self.config.roundabout).then_some(&self.signal)
    }

    pub fn is_roundabout(&self) -> bool {
        self.config.roundabout
    }

    pub fn metrics(&self) -> &MetricsSnapshot {
        &self.metrics
    }

    pub fn history(&self) -> &MetricsHistory {
        &self.history
    }

    pub fn totals(&self) -> PopulationTotals {
        self.population.totals()
    }

    pub fn queue_lengths(&self) -> QueueLengths {
        QueueLengths::from_vehicles(&self.vehicles)
    }

    pub fn place_obstruction(
        &mut self,
        x: f32,
        z: f32,
        kind: ObstructionKind,
    ) -> Result<Obstruction, PlacementError> {
        self.obstructions.place(Position::new(x, z), kind)
    }

    pub fn place_obstruction_with_length(
        &mut self,
        x: f32,
        z: f32,
        kind: ObstructionKind,
        length: f32,
    ) -> Result<Obstruction, PlacementError> {
        self.obstructions
            .place_with_length(Position::new(x, z), kind, length)
    }

    /// Returns false if no obstruction had that id
    pub fn remove_obstruction(&mut self, id: ObstructionId) -> bool {
        let removed = self.obstructions.remove(id).is_some();
        if !removed {
            warn!("Obstruction {} not found", id);
        }
        removed
    }

    pub fn clear_obstructions(&mut self) -> usize {
        self.obstructions.clear()
    }

    /// Replace the signal durations until the next reset
    pub fn set_signal_durations(&mut self, timings: SignalTimings) -> Result<()> {
        self.signal.set_timings(timings)
    }

    /// Shift green time toward the longer queues right now
    pub fn optimize_signals(&mut self) -> bool {
        if self.config.roundabout {
            return false;
        }
        let queues = self.queue_lengths();
        self.signal.optimize(&queues, &self.config.adaptive)
    }

    pub fn set_spawn_mode(&mut self, mode: SpawnMode) {
        info!("Spawn mode set to {:?}", mode);
        self.config.spawn.mode = mode;
        self.population.set_mode(mode);
    }

    /// Gate spawning by an arrival rate in vehicles per second, or remove the gate
    pub fn set_spawn_rate(&mut self, rate: Option<f32>) {
        self.population.set_arrival_rate(rate);
        self.config.spawn.arrival_rate = self.population.policy().arrival_rate;
    }

    /// Switch between the signalized junction and the roundabout.
    ///
    /// Live vehicles are dropped since their paths belong to the old layout.
    pub fn set_roundabout(&mut self, roundabout: bool) {
        if roundabout == self.config.roundabout {
            return;
        }
        info!(
            "Layout switched to {}, removing {} vehicles",
            if roundabout { "roundabout" } else { "signalized junction" },
            self.vehicles.len()
        );
        self.config.roundabout = roundabout;
        let dropped = std::mem::take(&mut self.vehicles);
        self.population.discard(dropped);
        self.metrics = metrics::snapshot(&self.vehicles, &self.population.totals(), self.time);
    }

    /// Spawn a specific vehicle immediately
    pub fn spawn_vehicle(
        &mut self,
        entry: Direction,
        turn: TurnIntent,
        class: VehicleClass,
    ) -> Result<VehicleId> {
        let ctx = SpawnContext {
            now: self.time,
            delta_secs: 0.0,
            live: &self.vehicles,
            obstructions: &self.obstructions,
            geometry: &self.config.geometry,
            roundabout: self.config.roundabout,
            params: &self.config.kinematics,
        };
        let vehicle = self.population.spawn(&ctx, entry, turn, class)?;
        let id = vehicle.id;
        self.vehicles.push(vehicle);
        Ok(id)
    }

    /// Clear vehicles and obstructions and restore the configured signal timing
    pub fn reset(&mut self) {
        info!(
            "Resetting simulation at t={:.1}s ({} vehicles, {} obstructions)",
            self.time,
            self.vehicles.len(),
            self.obstructions.len()
        );
        *self = Self::with_config(self.config.clone());
    }

    /// Advance the simulation by a frame of `delta_secs` seconds.
    ///
    /// Long frames are truncated and split into equal sub-steps so the
    /// kinematics never integrate over more than `max_substep`.
    pub fn step(&mut self, delta_secs: f32) {
        if !delta_secs.is_finite() || delta_secs <= 0.0 {
            debug!("Ignoring step with dt={}", delta_secs);
            return;
        }

        let stepping = self.config.stepping;
        let frame = delta_secs.min(stepping.max_frame_dt);
        let substeps = (frame / stepping.max_substep).ceil().max(1.0) as usize;
        let sub_dt = frame / substeps as f32;

        for _ in 0..substeps {
            self.tick(sub_dt);
        }

        self.metrics = metrics::snapshot(&self.vehicles, &self.population.totals(), self.time);
        self.history
            .record(&self.metrics, self.config.metrics.sample_interval);
    }

    /// Single fixed sub-step
    fn tick(&mut self, delta_secs: f32) {
        self.time += delta_secs;

        if !self.config.roundabout
            && self.signal.tick(delta_secs)
            && self.signal.phase() == SignalPhase::NsGreen
            && self.config.adaptive_signals
        {
            self.optimize_signals();
        }

        let previous = std::mem::take(&mut self.vehicles);
        let ctx = AdvanceContext {
            now: self.time,
            signal: (!self.config.roundabout).then_some(&self.signal),
            obstructions: &self.obstructions,
            neighbors: &previous,
            params: &self.config.kinematics,
        };
        let advanced: Vec<SimVehicle> = previous
            .iter()
            .map(|vehicle| vehicle.advance(delta_secs, &ctx))
            .collect();

        self.vehicles = self.population.retire(advanced);

        let spawn_ctx = SpawnContext {
            now: self.time,
            delta_secs,
            live: &self.vehicles,
            obstructions: &self.obstructions,
            geometry: &self.config.geometry,
            roundabout: self.config.roundabout,
            params: &self.config.kinematics,
        };
        if let Some(vehicle) = self.population.maybe_spawn(&spawn_ctx) {
            self.vehicles.push(vehicle);
        }
    }

    /// Build the export document for the latest snapshot
    pub fn export_document(&self) -> MetricsExport {
        MetricsExport {
            layout: if self.config.roundabout {
                "roundabout"
            } else {
                "signalized"
            },
            spawn_mode: self.population.policy().mode,
            metrics: self.metrics.clone(),
            obstruction_count: self.obstructions.len(),
            obstructions: self.obstructions.iter().copied().collect(),
            signal: self.signal().map(|signal| SignalExport {
                phase: signal.phase(),
                countdown: signal.countdown(),
                timings: *signal.timings(),
                cycles: signal.cycles(),
            }),
        }
    }

    pub fn write_export(&self, path: &Path) -> Result<()> {
        self.export_document().write(path)?;
        info!("Metrics exported to {}", path.display());
        Ok(())
    }

    /// Log a summary of the world state
    pub fn log_summary(&self) {
        info!("=== Junction Simulation Summary ===");
        info!("{}", self.metrics.summary());
        match self.signal() {
            Some(signal) => info!(
                "Signal: {:?} ({:.1}s left, cycle {})",
                signal.phase(),
                signal.countdown(),
                signal.cycles()
            ),
            None => info!("Layout: roundabout"),
        }
        let queues = &self.metrics.queue_lengths;
        info!(
            "Queues: N={} S={} E={} W={}",
            queues.north, queues.south, queues.east, queues.west
        );
        for obstruction in self.obstructions.iter() {
            info!(
                "  {} {} at ({:.1}, {:.1}) r={:.1}",
                obstruction.id,
                obstruction.kind,
                obstruction.position.x,
                obstruction.position.z,
                obstruction.radius
            );
        }
    }
}
