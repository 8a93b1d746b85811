//! Junction Traffic Simulation Library
//!
//! A headless simulation of one four-arm junction, signalized or roundabout,
//! with road obstructions and fleet metrics.

pub mod simulation;
