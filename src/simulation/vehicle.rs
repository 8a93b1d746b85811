//! Vehicle kinematics for the junction simulation
//!
//! `advance` is a pure function of a vehicle, the elapsed time and a
//! read-only context. Every vehicle in a tick sees the same pre-tick
//! snapshot of its neighbours, so update order never matters.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use super::obstruction::ObstructionField;
use super::path::STOP_LINE_INDEX;
use super::signal::SignalController;
use super::types::{
    safety_distance, Direction, Position, TurnIntent, VehicleClass, VehicleId,
    VehiclePerformance, SAFE_FOLLOWING_MULTIPLIER,
};

/// A smoothed target below this, with nothing to drive toward, is zero
const TARGET_SNAP: f32 = 0.01;

/// How far short of a hold point a vehicle comes to rest, beyond the
/// waypoint epsilon at the stop line
const LINE_CLEARANCE: f32 = 0.05;

/// Slowdown factors for a leader within 2x and 3x the safety distance
const CLOSE_LEADER_FACTOR: f32 = 0.3;
const NEAR_LEADER_FACTOR: f32 = 0.6;

/// Tuning for the per-tick vehicle update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicsParams {
    /// Minimum cosine between heading and the direction to a leader
    pub forward_cone: f32,
    /// Minimum cosine between the two headings for a leader to count
    pub heading_alignment: f32,
    /// Leaders further than this are ignored
    pub detection_range: f32,
    pub safe_following_multiplier: f32,
    /// Slow and stop for leaders ahead
    pub following: bool,
    /// Distance before the stop line at which the signal is obeyed
    pub signal_lookahead: f32,
    /// How far along its path a vehicle looks for blocked zones
    pub obstruction_lookahead: f32,
    /// Per-tick blend of the smoothed target toward the instantaneous target
    pub target_smoothing: f32,
    /// Speeds at or below this count as stopped
    pub stop_speed: f32,
    /// Arrival radius around a waypoint
    pub waypoint_epsilon: f32,
    /// Heading blend rate per second
    pub heading_smoothing: f32,
    /// Time constant of the wait-time decay while moving, in seconds
    pub wait_decay_tau: f32,
    /// Continuous stop time before a vehicle reports itself waiting
    pub waiting_hysteresis: f32,
}

impl Default for KinematicsParams {
    fn default() -> Self {
        Self {
            forward_cone: 0.7,
            heading_alignment: 0.5,
            detection_range: 20.0,
            safe_following_multiplier: SAFE_FOLLOWING_MULTIPLIER,
            following: true,
            signal_lookahead: 30.0,
            obstruction_lookahead: 30.0,
            target_smoothing: 0.12,
            stop_speed: 0.1,
            waypoint_epsilon: 1.0,
            heading_smoothing: 8.0,
            wait_decay_tau: 5.0,
            waiting_hysteresis: 0.5,
        }
    }
}

/// Everything outside the vehicle that its update reads
pub struct AdvanceContext<'a> {
    /// Simulation clock at the end of this tick
    pub now: f32,
    /// `None` when no signal governs the junction (roundabout)
    pub signal: Option<&'a SignalController>,
    pub obstructions: &'a ObstructionField,
    /// Pre-tick snapshot of every live vehicle, possibly including this one
    pub neighbors: &'a [SimVehicle],
    pub params: &'a KinematicsParams,
}

/// Why a vehicle is held this tick
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Blocking {
    /// Inside a blocked zone
    obstruction: bool,
    leader: bool,
    /// Distance to where the vehicle must stop short of the stop line
    line_hold: Option<f32>,
    /// Distance to where the vehicle must stop short of a blocked zone ahead
    zone_hold: Option<f32>,
}

impl Blocking {
    /// Brake toward zero wherever the vehicle happens to be
    fn stopped(&self) -> bool {
        self.obstruction || self.leader
    }

    /// Nearest point along the path the vehicle must not pass
    fn hold_distance(&self) -> Option<f32> {
        match (self.line_hold, self.zone_hold) {
            (Some(line), Some(zone)) => Some(line.min(zone)),
            (line, zone) => line.or(zone),
        }
    }
}

/// Distance needed to stop from `speed` at a constant `deceleration`
fn braking_distance(speed: f32, deceleration: f32) -> f32 {
    speed * speed / (2.0 * deceleration)
}

/// A vehicle in the traffic simulation
#[derive(Debug, Clone, PartialEq)]
pub struct SimVehicle {
    pub id: VehicleId,
    pub class: VehicleClass,
    pub position: Position,
    /// Y-axis rotation, see [`Position::angle_to`]
    pub heading: f32,
    pub speed: f32,
    /// Low-pass filtered speed the vehicle is driving toward
    pub target_speed: f32,
    pub entry: Direction,
    pub turn: TurnIntent,
    pub path: Vec<Position>,
    /// Next unvisited waypoint; equals `path.len()` once the path is complete
    pub path_index: usize,
    /// Accrued waiting time, decaying while the vehicle moves
    pub wait_time: f32,
    /// Continuous time spent stopped
    pub stopped_for: f32,
    /// Grams of CO2 emitted so far
    pub emissions: f32,
    pub is_waiting: bool,
    pub spawned_at: f32,
    /// Injected hold at the stop line, in seconds (0 disables)
    pub stop_line_delay: f32,
    /// Simulation time until which the injected hold lasts, once started
    pub hold_until: Option<f32>,
}

impl SimVehicle {
    /// Create a stationary vehicle on the first waypoint of `path`.
    ///
    /// Returns `None` for a path too short to drive.
    pub fn new(
        id: VehicleId,
        class: VehicleClass,
        entry: Direction,
        turn: TurnIntent,
        path: Vec<Position>,
        spawned_at: f32,
    ) -> Option<Self> {
        if path.len() < 2 {
            return None;
        }
        let position = path[0];
        let heading = position.angle_to(&path[1]);
        Some(Self {
            id,
            class,
            position,
            heading,
            speed: 0.0,
            target_speed: 0.0,
            entry,
            turn,
            path,
            path_index: 1,
            wait_time: 0.0,
            stopped_for: 0.0,
            emissions: 0.0,
            is_waiting: false,
            spawned_at,
            stop_line_delay: 0.0,
            hold_until: None,
        })
    }

    pub fn performance(&self) -> &'static VehiclePerformance {
        self.class.performance()
    }

    pub fn velocity(&self) -> Position {
        Position::from_heading(self.heading) * self.speed
    }

    /// The vehicle has reached the end of its path and must be retired
    pub fn is_terminal(&self) -> bool {
        self.path_index >= self.path.len()
    }

    pub fn next_waypoint(&self) -> Option<Position> {
        self.path.get(self.path_index).copied()
    }

    /// Straight-line distance to the stop line while still approaching it
    pub fn distance_to_stop_line(&self) -> Option<f32> {
        if self.path_index > STOP_LINE_INDEX {
            return None;
        }
        self.path
            .get(STOP_LINE_INDEX)
            .map(|line| self.position.distance(line))
    }

    /// Distance along the remaining path to the nearest blocked zone ahead
    pub fn distance_to_blocked_zone(
        &self,
        obstructions: &ObstructionField,
        horizon: f32,
    ) -> Option<f32> {
        let remaining = self.path.get(self.path_index..)?;
        let route: Vec<Position> = std::iter::once(self.position)
            .chain(remaining.iter().copied())
            .collect();
        obstructions.first_blocked_along(&route, horizon)
    }

    /// Nearest vehicle ahead as (distance, safety distance)
    fn nearest_leader(
        &self,
        neighbors: &[SimVehicle],
        params: &KinematicsParams,
    ) -> Option<(f32, f32)> {
        let heading = Position::from_heading(self.heading);
        neighbors
            .iter()
            .filter(|other| other.id != self.id && !other.is_terminal())
            .filter_map(|other| {
                let offset = other.position - self.position;
                let distance = offset.length();
                if distance > params.detection_range {
                    return None;
                }
                let towards = offset.normalized()?;
                let ahead = heading.dot(&towards) > params.forward_cone;
                let aligned =
                    heading.dot(&Position::from_heading(other.heading)) > params.heading_alignment;
                if !(ahead && aligned) {
                    return None;
                }
                let safety =
                    safety_distance(self.class, other.class, params.safe_following_multiplier);
                Some((distance, safety))
            })
            .min_by_key(|(distance, _)| OrderedFloat(*distance))
    }

    /// Produce this vehicle's state `delta_secs` later
    pub fn advance(&self, delta_secs: f32, ctx: &AdvanceContext) -> SimVehicle {
        let mut next = self.clone();
        if self.is_terminal() || delta_secs <= 0.0 {
            return next;
        }

        let params = ctx.params;
        let perf = self.performance();
        let mut blocking = Blocking::default();

        if let Some(distance) = self.distance_to_stop_line() {
            let line_hold = (distance - params.waypoint_epsilon - LINE_CLEARANCE).max(0.0);

            // Start the injected stop-line hold once the vehicle reaches the line
            if self.stop_line_delay > 0.0
                && self.hold_until.is_none()
                && distance <= 2.0 * params.waypoint_epsilon
            {
                next.hold_until = Some(ctx.now + self.stop_line_delay);
            }
            let delay_pending = self.stop_line_delay > 0.0
                && !next.hold_until.is_some_and(|until| ctx.now >= until);

            // A vehicle that can no longer stop before the line at its class
            // deceleration is committed and clears the junction
            let signal_stop = ctx.signal.is_some_and(|signal| {
                distance <= params.signal_lookahead
                    && !signal.allows(self.entry)
                    && braking_distance(self.speed, perf.deceleration)
                        <= line_hold + params.waypoint_epsilon
            });

            if delay_pending || signal_stop {
                blocking.line_hold = Some(line_hold);
            }
        }

        blocking.obstruction = ctx.obstructions.is_blocked_at(self.position);
        if !blocking.obstruction {
            blocking.zone_hold = self
                .distance_to_blocked_zone(ctx.obstructions, params.obstruction_lookahead)
                .map(|edge| (edge - LINE_CLEARANCE).max(0.0));
        }

        let mut factor = ctx.obstructions.speed_factor_at(self.position);
        if params.following {
            if let Some((distance, safety)) = self.nearest_leader(ctx.neighbors, params) {
                if distance < safety {
                    blocking.leader = true;
                } else if distance < 2.0 * safety {
                    factor *= CLOSE_LEADER_FACTOR;
                } else if distance < 3.0 * safety {
                    factor *= NEAR_LEADER_FACTOR;
                }
            }
        }

        let instant_target = if blocking.stopped() {
            0.0
        } else {
            perf.max_speed * factor
        };
        let mut target =
            self.target_speed + (instant_target - self.target_speed) * params.target_smoothing;
        if instant_target == 0.0 && target < TARGET_SNAP {
            target = 0.0;
        }
        next.target_speed = target;

        next.speed = if self.speed < target {
            (self.speed + perf.acceleration * delta_secs).min(target)
        } else {
            (self.speed - perf.deceleration * delta_secs).max(target)
        }
        .clamp(0.0, perf.max_speed);

        // Never faster than what still stops at the hold point
        let hold = blocking.hold_distance();
        if let Some(distance) = hold {
            let cap = (2.0 * perf.deceleration * distance).sqrt();
            next.speed = if cap <= params.stop_speed {
                (self.speed - perf.deceleration * delta_secs).clamp(0.0, cap)
            } else {
                next.speed.min(cap)
            };
            next.target_speed = next.target_speed.min(cap);
        }

        if next.speed > params.stop_speed {
            let at_line = blocking.line_hold.is_some();
            self.move_toward_waypoint(&mut next, delta_secs, hold, at_line, params);
        }

        if next.speed <= params.stop_speed {
            next.wait_time += delta_secs;
            next.stopped_for += delta_secs;
            next.emissions += perf.idle_emission_rate * delta_secs;
        } else {
            next.wait_time *= (-delta_secs / params.wait_decay_tau).exp();
            next.stopped_for = 0.0;
            next.emissions += perf.emission_per_unit * next.speed * delta_secs;
        }
        next.is_waiting = next.stopped_for > params.waiting_hysteresis;

        debug_assert!(next.path_index >= self.path_index);
        debug_assert!(next.path_index <= next.path.len());
        next
    }

    fn move_toward_waypoint(
        &self,
        next: &mut SimVehicle,
        delta_secs: f32,
        hold: Option<f32>,
        at_line: bool,
        params: &KinematicsParams,
    ) {
        let Some(waypoint) = self.next_waypoint() else {
            return;
        };
        let to_waypoint = waypoint - self.position;
        let remaining = to_waypoint.length();

        let held_at_line = at_line && self.path_index == STOP_LINE_INDEX;

        let direction = match to_waypoint.normalized() {
            Some(direction) if remaining >= params.waypoint_epsilon => direction,
            // Already on the waypoint, nothing to steer toward
            _ => {
                if !held_at_line {
                    next.path_index += 1;
                }
                return;
            }
        };

        let mut travel = (next.speed * delta_secs).min(remaining);
        if let Some(limit) = hold {
            travel = travel.min(limit);
        }

        next.position = self.position + direction * travel;
        let desired = Position::ORIGIN.angle_to(&direction);
        next.heading = blend_heading(
            self.heading,
            desired,
            (params.heading_smoothing * delta_secs).min(1.0),
        );

        if remaining - travel < params.waypoint_epsilon {
            next.path_index += 1;
        }
    }
}

/// Rotate `current` toward `desired` by a fraction of the shortest turn
fn blend_heading(current: f32, desired: f32, fraction: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let mut diff = (desired - current) % TAU;
    if diff > PI {
        diff -= TAU;
    } else if diff < -PI {
        diff += TAU;
    }
    let heading = current + diff * fraction;
    // Keep headings in (-PI, PI]
    if heading > PI {
        heading - TAU
    } else if heading <= -PI {
        heading + TAU
    } else {
        heading
    }
}
