//! Vehicle spawning and retirement
//!
//! Owns every counter tied to the vehicle lifecycle: the id sequence, the
//! last spawn time and the lifetime totals.

use anyhow::Result;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::obstruction::ObstructionField;
use super::path::JunctionGeometry;
use super::types::{safety_distance, Direction, TurnIntent, VehicleClass, VehicleId};
use super::vehicle::{KinematicsParams, SimVehicle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnMode {
    /// Only explicit spawn requests add vehicles
    Off,
    Normal,
    /// High-load mode with a shorter inter-arrival interval
    Demo,
}

/// Relative weights of each turn intent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnWeights {
    pub straight: f32,
    pub left: f32,
    pub right: f32,
}

impl Default for TurnWeights {
    fn default() -> Self {
        Self {
            straight: 0.6,
            left: 0.2,
            right: 0.2,
        }
    }
}

impl TurnWeights {
    /// Map a uniform roll in [0, 1) to a turn intent
    pub fn pick(&self, roll: f32) -> Option<TurnIntent> {
        pick_weighted(
            &[
                (TurnIntent::Straight, self.straight),
                (TurnIntent::Left, self.left),
                (TurnIntent::Right, self.right),
            ],
            roll,
        )
    }
}

/// Relative weights of each vehicle class
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassWeights {
    pub car: f32,
    pub bus: f32,
    pub truck: f32,
}

impl Default for ClassWeights {
    fn default() -> Self {
        Self {
            car: 0.80,
            bus: 0.12,
            truck: 0.08,
        }
    }
}

impl ClassWeights {
    /// Map a uniform roll in [0, 1) to a vehicle class
    pub fn pick(&self, roll: f32) -> Option<VehicleClass> {
        pick_weighted(
            &[
                (VehicleClass::Car, self.car),
                (VehicleClass::Bus, self.bus),
                (VehicleClass::Truck, self.truck),
            ],
            roll,
        )
    }
}

/// Choose from weighted options with a uniform roll in [0, 1).
///
/// Negative weights count as zero; `None` if no option has weight.
pub fn pick_weighted<T: Copy>(options: &[(T, f32)], roll: f32) -> Option<T> {
    let total: f32 = options.iter().map(|(_, w)| w.max(0.0)).sum();
    if !(total > 0.0) || !total.is_finite() {
        return None;
    }
    let mut remaining = roll.clamp(0.0, 1.0) * total;
    let mut last = None;
    for (option, weight) in options {
        let weight = weight.max(0.0);
        if weight == 0.0 {
            continue;
        }
        if remaining < weight {
            return Some(*option);
        }
        remaining -= weight;
        last = Some(*option);
    }
    // roll == 1.0 or rounding at the top end
    last
}

/// Range of the injected stop-line hold used for baseline comparisons
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayWindow {
    pub min: f32,
    pub max: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnPolicy {
    pub mode: SpawnMode,
    /// Minimum seconds between spawns in normal mode
    pub normal_interval: f32,
    /// Minimum seconds between spawns in demo mode
    pub demo_interval: f32,
    /// Optional arrival rate (vehicles per second) gating each tick
    pub arrival_rate: Option<f32>,
    pub max_active: usize,
    pub max_total: usize,
    pub turn_weights: TurnWeights,
    pub class_weights: ClassWeights,
    /// Shed arrivals on approaches whose capacity is reduced by obstructions
    pub respect_capacity: bool,
    pub baseline_delay: Option<DelayWindow>,
}

impl Default for SpawnPolicy {
    fn default() -> Self {
        Self {
            mode: SpawnMode::Normal,
            normal_interval: 2.0,
            demo_interval: 0.8,
            arrival_rate: None,
            max_active: 40,
            max_total: 2000,
            turn_weights: TurnWeights::default(),
            class_weights: ClassWeights::default(),
            respect_capacity: true,
            baseline_delay: None,
        }
    }
}

impl SpawnPolicy {
    /// Minimum seconds between automatic spawns, `None` when switched off
    pub fn interval(&self) -> Option<f32> {
        match self.mode {
            SpawnMode::Off => None,
            SpawnMode::Normal => Some(self.normal_interval),
            SpawnMode::Demo => Some(self.demo_interval),
        }
    }
}

/// Lifetime counters of the population
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PopulationTotals {
    pub spawned: usize,
    pub completed: usize,
    /// Vehicles dropped before finishing, e.g. by a layout switch
    pub removed: usize,
    /// Grams of CO2 emitted by vehicles no longer live
    pub retired_emissions: f32,
}

/// Read-only world state a spawn decision looks at
pub struct SpawnContext<'a> {
    pub now: f32,
    pub delta_secs: f32,
    pub live: &'a [SimVehicle],
    pub obstructions: &'a ObstructionField,
    pub geometry: &'a JunctionGeometry,
    pub roundabout: bool,
    pub params: &'a KinematicsParams,
}

/// Why a spawn request produced no vehicle
#[derive(Debug, Clone, PartialEq)]
pub enum SpawnRejection {
    ActiveCap(usize),
    TotalCap(usize),
    EmptyPath(Direction, TurnIntent),
    Occupied(Direction),
}

impl fmt::Display for SpawnRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnRejection::ActiveCap(cap) => write!(f, "active vehicle cap of {} reached", cap),
            SpawnRejection::TotalCap(cap) => write!(f, "lifetime spawn cap of {} reached", cap),
            SpawnRejection::EmptyPath(entry, turn) => {
                write!(f, "no legal path entering from {} going {}", entry, turn)
            }
            SpawnRejection::Occupied(entry) => {
                write!(f, "spawn point on the {} approach is occupied", entry)
            }
        }
    }
}

impl std::error::Error for SpawnRejection {}

pub struct PopulationManager {
    policy: SpawnPolicy,
    /// Optional seeded RNG for reproducible simulations
    rng: Option<StdRng>,
    next_id: usize,
    last_spawn: Option<f32>,
    totals: PopulationTotals,
}

impl PopulationManager {
    pub fn new(policy: SpawnPolicy, seed: Option<u64>) -> Self {
        Self {
            policy,
            rng: seed.map(StdRng::seed_from_u64),
            next_id: 0,
            last_spawn: None,
            totals: PopulationTotals::default(),
        }
    }

    pub fn policy(&self) -> &SpawnPolicy {
        &self.policy
    }

    pub fn set_mode(&mut self, mode: SpawnMode) {
        self.policy.mode = mode;
    }

    pub fn set_arrival_rate(&mut self, rate: Option<f32>) {
        self.policy.arrival_rate = rate.filter(|r| r.is_finite() && *r >= 0.0);
    }

    pub fn totals(&self) -> PopulationTotals {
        self.totals
    }

    pub fn last_spawn_time(&self) -> Option<f32> {
        self.last_spawn
    }

    /// Get a random value in the given range, using seeded RNG if available
    fn random_range(&mut self, range: std::ops::Range<f32>) -> f32 {
        match &mut self.rng {
            Some(rng) => rng.random_range(range),
            None => rand::rng().random_range(range),
        }
    }

    fn random_direction(&mut self) -> Direction {
        let index = match &mut self.rng {
            Some(rng) => rng.random_range(0..Direction::ALL.len()),
            None => rand::rng().random_range(0..Direction::ALL.len()),
        };
        Direction::ALL[index]
    }

    fn next_vehicle_id(&mut self) -> VehicleId {
        let id = VehicleId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Whether the interval and caps allow an automatic spawn at `now`
    pub fn spawn_due(&self, now: f32, active: usize) -> bool {
        let Some(interval) = self.policy.interval() else {
            return false;
        };
        if let Some(last) = self.last_spawn {
            if now - last < interval {
                return false;
            }
        }
        active < self.policy.max_active && self.totals.spawned < self.policy.max_total
    }

    /// Run the automatic spawn policy for one tick
    pub fn maybe_spawn(&mut self, ctx: &SpawnContext) -> Option<SimVehicle> {
        if !self.spawn_due(ctx.now, ctx.live.len()) {
            return None;
        }

        if let Some(rate) = self.policy.arrival_rate {
            let probability = (rate * ctx.delta_secs).clamp(0.0, 1.0);
            if self.random_range(0.0..1.0) >= probability {
                return None;
            }
        }

        let entry = self.random_direction();
        let turn_roll = self.random_range(0.0..1.0);
        let class_roll = self.random_range(0.0..1.0);
        let turn = self.policy.turn_weights.pick(turn_roll)?;
        let class = self.policy.class_weights.pick(class_roll)?;

        if self.policy.respect_capacity {
            let reduction = ctx.obstructions.capacity_reduction_on(entry);
            if reduction > 0.0 && self.random_range(0.0..1.0) < reduction {
                debug!(
                    "Arrival on the {} approach shed (capacity -{:.0}%)",
                    entry,
                    reduction * 100.0
                );
                self.last_spawn = Some(ctx.now);
                return None;
            }
        }

        match self.build_vehicle(ctx, entry, turn, class) {
            Ok(vehicle) => Some(vehicle),
            Err(rejection @ SpawnRejection::EmptyPath(..)) => {
                warn!("Spawn discarded: {}", rejection);
                None
            }
            Err(rejection) => {
                debug!("Spawn declined: {}", rejection);
                None
            }
        }
    }

    /// Spawn a specific vehicle now, bypassing the interval but not the caps
    pub fn spawn(
        &mut self,
        ctx: &SpawnContext,
        entry: Direction,
        turn: TurnIntent,
        class: VehicleClass,
    ) -> Result<SimVehicle> {
        Ok(self.build_vehicle(ctx, entry, turn, class)?)
    }

    fn build_vehicle(
        &mut self,
        ctx: &SpawnContext,
        entry: Direction,
        turn: TurnIntent,
        class: VehicleClass,
    ) -> Result<SimVehicle, SpawnRejection> {
        if ctx.live.len() >= self.policy.max_active {
            return Err(SpawnRejection::ActiveCap(self.policy.max_active));
        }
        if self.totals.spawned >= self.policy.max_total {
            return Err(SpawnRejection::TotalCap(self.policy.max_total));
        }

        let path = ctx.geometry.generate_path(entry, turn, ctx.roundabout);
        if path.len() < 2 {
            return Err(SpawnRejection::EmptyPath(entry, turn));
        }
        let start = path[0];

        let multiplier = ctx.params.safe_following_multiplier;
        let occupied = ctx
            .live
            .iter()
            .any(|v| v.position.distance(&start) < safety_distance(class, v.class, multiplier));
        if occupied {
            return Err(SpawnRejection::Occupied(entry));
        }

        let delay = match self.policy.baseline_delay {
            Some(window) if window.max > window.min => self.random_range(window.min..window.max),
            Some(window) => window.min,
            None => 0.0,
        };

        let id = self.next_vehicle_id();
        let mut vehicle = SimVehicle::new(id, class, entry, turn, path, ctx.now)
            .ok_or(SpawnRejection::EmptyPath(entry, turn))?;
        vehicle.stop_line_delay = delay.max(0.0);

        self.totals.spawned += 1;
        self.last_spawn = Some(ctx.now);
        debug!(
            "Spawned {} {} from {} going {} (total {})",
            class, id, entry, turn, self.totals.spawned
        );
        Ok(vehicle)
    }

    /// Remove vehicles that reached the end of their path
    pub fn retire(&mut self, vehicles: Vec<SimVehicle>) -> Vec<SimVehicle> {
        let (done, live): (Vec<SimVehicle>, Vec<SimVehicle>) =
            vehicles.into_iter().partition(|v| v.is_terminal());

        for vehicle in done {
            self.totals.completed += 1;
            self.totals.retired_emissions += vehicle.emissions;
            debug!(
                "Retired {} {} (waited {:.1}s, {:.0}g CO2)",
                vehicle.class, vehicle.id, vehicle.wait_time, vehicle.emissions
            );
        }
        live
    }

    /// Drop vehicles that will never finish, keeping their emissions on the books.
    /// Returns how many were dropped.
    pub fn discard(&mut self, vehicles: Vec<SimVehicle>) -> usize {
        let count = vehicles.len();
        self.totals.removed += count;
        self.totals.retired_emissions += vehicles.iter().map(|v| v.emissions).sum::<f32>();
        if count > 0 {
            debug!("Discarded {} unfinished vehicles", count);
        }
        count
    }
}
