//! Standalone junction simulation kernel
//!
//! This module contains all the traffic logic for a single four-arm
//! junction, either signalized or a roundabout. Nothing in here renders or
//! reads input; a driver steps [`SimWorld`] and reads its state back.

mod config;
mod export;
mod metrics;
mod obstruction;
mod path;
mod population;
mod signal;
mod types;
mod vehicle;
mod world;

// Re-export public types for external use
// These may not be used within this crate but are part of the public API
#[allow(unused_imports)]
pub use config::{SimConfig, SteppingParams};
#[allow(unused_imports)]
pub use export::{MetricsExport, SignalExport};
#[allow(unused_imports)]
pub use metrics::{snapshot, MetricsHistory, MetricsParams, MetricsSnapshot, QueueLengths};
#[allow(unused_imports)]
pub use obstruction::{
    Obstruction, ObstructionEffect, ObstructionField, ObstructionKind, PlacementError,
};
#[allow(unused_imports)]
pub use path::{generate_path, JunctionGeometry, STOP_LINE_INDEX};
#[allow(unused_imports)]
pub use population::{
    pick_weighted, ClassWeights, DelayWindow, PopulationManager, PopulationTotals, SpawnContext,
    SpawnMode, SpawnPolicy, SpawnRejection, TurnWeights,
};
#[allow(unused_imports)]
pub use signal::{
    AdaptivePolicy, SignalColor, SignalController, SignalGroup, SignalPhase, SignalTimings,
};
#[allow(unused_imports)]
pub use types::{
    safety_distance, Direction, ObstructionId, Position, TurnIntent, VehicleClass, VehicleId,
    VehiclePerformance, SAFE_FOLLOWING_MULTIPLIER,
};
#[allow(unused_imports)]
pub use vehicle::{AdvanceContext, KinematicsParams, SimVehicle};
pub use world::SimWorld;
