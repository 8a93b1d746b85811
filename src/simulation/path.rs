//! Path generation through the junction
//!
//! Every vehicle gets its whole route at spawn: an ordered list of ground
//! plane waypoints from the spawn boundary, through the stop line and the
//! junction (or around the roundabout), out to the far boundary.

use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;

use super::types::{Direction, Position, TurnIntent};

/// Waypoint 1 of every generated path is the stop line (or roundabout yield line)
pub const STOP_LINE_INDEX: usize = 1;

/// Fixed layout of the four-arm junction
///
/// The junction centre sits at the origin with arms along the x and z axes.
/// Traffic keeps to the right.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JunctionGeometry {
    /// Distance from the road centreline to the middle of a lane
    pub lane_offset: f32,
    /// Half the width of each road corridor
    pub road_half_width: f32,
    /// Distance from the centre to the stop line on every arm
    pub stop_line: f32,
    /// Distance from the centre to where vehicles appear and leave
    pub spawn_distance: f32,
    pub roundabout_radius: f32,
    /// Gap between the ring and the roundabout yield line
    pub roundabout_yield_gap: f32,
    /// Number of points approximating the ring; must be a multiple of 4
    pub ring_resolution: usize,
    /// Interior points used to approximate a turning arc
    pub turn_samples: usize,
}

impl Default for JunctionGeometry {
    fn default() -> Self {
        Self {
            lane_offset: 1.75,
            road_half_width: 10.0,
            stop_line: 15.0,
            spawn_distance: 100.0,
            roundabout_radius: 22.0,
            roundabout_yield_gap: 6.0,
            ring_resolution: 32,
            turn_samples: 2,
        }
    }
}

/// Generate a path with the default junction layout
pub fn generate_path(entry: Direction, turn: TurnIntent, roundabout: bool) -> Vec<Position> {
    JunctionGeometry::default().generate_path(entry, turn, roundabout)
}

fn quadratic_bezier(p0: Position, p1: Position, p2: Position, t: f32) -> Position {
    let u = 1.0 - t;
    p0 * (u * u) + p1 * (2.0 * u * t) + p2 * (t * t)
}

impl JunctionGeometry {
    fn is_valid_signalized(&self) -> bool {
        let values = [
            self.lane_offset,
            self.road_half_width,
            self.stop_line,
            self.spawn_distance,
        ];
        values.iter().all(|v| v.is_finite())
            && self.lane_offset > 0.0
            && self.lane_offset < self.road_half_width
            && self.stop_line > self.lane_offset
            && self.spawn_distance > self.stop_line
    }

    fn is_valid_roundabout(&self) -> bool {
        self.is_valid_signalized()
            && self.roundabout_radius.is_finite()
            && self.roundabout_yield_gap.is_finite()
            && self.roundabout_radius > self.road_half_width
            && self.roundabout_yield_gap > 0.0
            && self.roundabout_radius + self.roundabout_yield_gap < self.spawn_distance
            && self.ring_resolution >= 4
            && self.ring_resolution % 4 == 0
    }

    /// Whether a coordinate lies on one of the two road corridors
    pub fn is_on_road(&self, position: Position) -> bool {
        if !position.x.is_finite() || !position.z.is_finite() {
            return false;
        }
        let on_ns = position.x.abs() <= self.road_half_width
            && position.z.abs() <= self.spawn_distance;
        let on_ew = position.z.abs() <= self.road_half_width
            && position.x.abs() <= self.spawn_distance;
        on_ns || on_ew
    }

    /// The arm a coordinate sits on, or `None` inside the junction box or off-road
    pub fn approach_of(&self, position: Position) -> Option<Direction> {
        if !self.is_on_road(position) {
            return None;
        }
        if position.x.abs() <= self.road_half_width {
            if position.z > self.stop_line {
                return Some(Direction::North);
            }
            if position.z < -self.stop_line {
                return Some(Direction::South);
            }
        }
        if position.z.abs() <= self.road_half_width {
            if position.x > self.stop_line {
                return Some(Direction::East);
            }
            if position.x < -self.stop_line {
                return Some(Direction::West);
            }
        }
        None
    }

    /// Point on the lane of `arm` travelling along `travel`, `distance` from the centre
    fn lane_point(&self, arm: Direction, distance: f32, travel: Position) -> Position {
        arm.arm_vector() * distance + travel.right() * self.lane_offset
    }

    /// Ordered waypoints for a vehicle entering on `entry` and making `turn`.
    ///
    /// Returns an empty path when the layout cannot produce a legal route.
    pub fn generate_path(
        &self,
        entry: Direction,
        turn: TurnIntent,
        roundabout: bool,
    ) -> Vec<Position> {
        if roundabout {
            if !self.is_valid_roundabout() {
                return Vec::new();
            }
            self.roundabout_path(entry, turn)
        } else {
            if !self.is_valid_signalized() {
                return Vec::new();
            }
            self.signalized_path(entry, turn)
        }
    }

    fn signalized_path(&self, entry: Direction, turn: TurnIntent) -> Vec<Position> {
        let inbound = -entry.arm_vector();
        let outbound = turn.exit_heading(inbound);
        let exit = Direction::from_vector(outbound);

        let stop = self.lane_point(entry, self.stop_line, inbound);
        let exit_start = self.lane_point(exit, self.stop_line, outbound);

        let mut path = Vec::with_capacity(4 + self.turn_samples);
        path.push(self.lane_point(entry, self.spawn_distance, inbound));
        path.push(stop);

        if turn != TurnIntent::Straight {
            // Both lane centrelines pass through this corner
            let corner = inbound.right() * self.lane_offset + outbound.right() * self.lane_offset;
            let samples = self.turn_samples;
            for i in 1..=samples {
                let t = i as f32 / (samples + 1) as f32;
                path.push(quadratic_bezier(stop, corner, exit_start, t));
            }
        }

        path.push(exit_start);
        path.push(self.lane_point(exit, self.spawn_distance, outbound));
        path
    }

    fn ring_point(&self, index: usize) -> Position {
        let angle = TAU * (index % self.ring_resolution) as f32 / self.ring_resolution as f32;
        Position::new(angle.cos(), angle.sin()) * self.roundabout_radius
    }

    /// Ring index on the axis of an arm; index 0 lies on the east axis and
    /// indices grow counter-clockwise
    fn ring_index(&self, arm: Direction) -> usize {
        let quarter = self.ring_resolution / 4;
        match arm {
            Direction::East => 0,
            Direction::North => quarter,
            Direction::West => 2 * quarter,
            Direction::South => 3 * quarter,
        }
    }

    fn roundabout_path(&self, entry: Direction, turn: TurnIntent) -> Vec<Position> {
        let inbound = -entry.arm_vector();
        let outbound = turn.exit_heading(inbound);
        let exit = Direction::from_vector(outbound);
        let yield_distance = self.roundabout_radius + self.roundabout_yield_gap;

        let steps = turn.ring_quarters() * self.ring_resolution / 4;
        let entry_index = self.ring_index(entry);
        debug_assert_eq!((entry_index + steps) % self.ring_resolution, self.ring_index(exit));

        let mut path = Vec::with_capacity(steps + 5);
        path.push(self.lane_point(entry, self.spawn_distance, inbound));
        path.push(self.lane_point(entry, yield_distance, inbound));
        for k in 0..=steps {
            path.push(self.ring_point(entry_index + k));
        }
        path.push(self.lane_point(exit, yield_distance, outbound));
        path.push(self.lane_point(exit, self.spawn_distance, outbound));
        path
    }
}
