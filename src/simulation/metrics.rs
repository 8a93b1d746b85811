//! Fleet-wide traffic metrics
//!
//! Snapshots are recomputed from the live vehicle set every time; the only
//! running state they depend on is the population totals and the clock.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::population::PopulationTotals;
use super::types::Direction;
use super::vehicle::SimVehicle;

/// Waiting vehicles per approach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct QueueLengths {
    pub north: usize,
    pub south: usize,
    pub east: usize,
    pub west: usize,
}

impl QueueLengths {
    pub fn from_vehicles(vehicles: &[SimVehicle]) -> Self {
        let mut queues = QueueLengths::default();
        for vehicle in vehicles.iter().filter(|v| v.is_waiting) {
            *queues.get_mut(vehicle.entry) += 1;
        }
        queues
    }

    pub fn get(&self, direction: Direction) -> usize {
        match direction {
            Direction::North => self.north,
            Direction::South => self.south,
            Direction::East => self.east,
            Direction::West => self.west,
        }
    }

    fn get_mut(&mut self, direction: Direction) -> &mut usize {
        match direction {
            Direction::North => &mut self.north,
            Direction::South => &mut self.south,
            Direction::East => &mut self.east,
            Direction::West => &mut self.west,
        }
    }

    pub fn north_south(&self) -> usize {
        self.north + self.south
    }

    pub fn east_west(&self) -> usize {
        self.east + self.west
    }

    pub fn total(&self) -> usize {
        self.north_south() + self.east_west()
    }
}

/// Read model of the simulation at one instant
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Simulated seconds since start or reset
    pub time: f32,
    pub total_spawned: usize,
    pub completed: usize,
    /// Vehicles dropped before finishing their trip
    pub removed: usize,
    pub active_vehicles: usize,
    /// Mean accrued wait over active vehicles, seconds
    pub average_wait: f32,
    pub average_speed: f32,
    /// Cumulative CO2 of every vehicle ever spawned, in kg
    pub co2_kg: f32,
    /// Share of active vehicles currently waiting, 0-100
    pub congestion: f32,
    pub throughput_per_minute: f32,
    pub queue_lengths: QueueLengths,
}

impl MetricsSnapshot {
    pub fn is_finite(&self) -> bool {
        [
            self.time,
            self.average_wait,
            self.average_speed,
            self.co2_kg,
            self.congestion,
            self.throughput_per_minute,
        ]
        .iter()
        .all(|v| v.is_finite())
    }

    pub fn summary(&self) -> String {
        format!(
            concat!(
                "t={:.1}s active={} spawned={} completed={} removed={} wait={:.1}s speed={:.1} ",
                "congestion={:.0}% throughput={:.1}/min CO2={:.2}kg"
            ),
            self.time,
            self.active_vehicles,
            self.total_spawned,
            self.completed,
            self.removed,
            self.average_wait,
            self.average_speed,
            self.congestion,
            self.throughput_per_minute,
            self.co2_kg
        )
    }
}

fn ratio(numerator: f32, denominator: f32) -> f32 {
    if denominator > 0.0 && numerator.is_finite() {
        numerator / denominator
    } else {
        0.0
    }
}

/// Compute a snapshot from the live vehicles
pub fn snapshot(
    vehicles: &[SimVehicle],
    totals: &PopulationTotals,
    elapsed: f32,
) -> MetricsSnapshot {
    let active = vehicles.len();
    let count = active as f32;

    let total_wait: f32 = vehicles.iter().map(|v| v.wait_time).sum();
    let total_speed: f32 = vehicles.iter().map(|v| v.speed).sum();
    let live_emissions: f32 = vehicles.iter().map(|v| v.emissions).sum();
    let waiting = vehicles.iter().filter(|v| v.is_waiting).count() as f32;

    MetricsSnapshot {
        time: elapsed,
        total_spawned: totals.spawned,
        completed: totals.completed,
        removed: totals.removed,
        active_vehicles: active,
        average_wait: ratio(total_wait, count),
        average_speed: ratio(total_speed, count),
        co2_kg: (totals.retired_emissions + live_emissions) / 1000.0,
        congestion: ratio(waiting, count) * 100.0,
        throughput_per_minute: ratio(totals.completed as f32, elapsed / 60.0),
        queue_lengths: QueueLengths::from_vehicles(vehicles),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsParams {
    /// Simulated seconds between history samples
    pub sample_interval: f32,
    /// Number of samples kept
    pub history_capacity: usize,
}

impl Default for MetricsParams {
    fn default() -> Self {
        Self {
            sample_interval: 1.0,
            history_capacity: 300,
        }
    }
}

/// Bounded time series of snapshots for dashboards
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    capacity: usize,
    samples: VecDeque<MetricsSnapshot>,
}

impl MetricsHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Keep the snapshot if at least `interval` has passed since the last
    /// sample. Returns true when it was kept.
    pub fn record(&mut self, snapshot: &MetricsSnapshot, interval: f32) -> bool {
        if self.capacity == 0 {
            return false;
        }
        if let Some(last) = self.samples.back() {
            if snapshot.time - last.time < interval {
                return false;
            }
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(snapshot.clone());
        true
    }

    pub fn latest(&self) -> Option<&MetricsSnapshot> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricsSnapshot> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
