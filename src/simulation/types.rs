//! Core types for the junction simulation
//!
//! Plain data shared by every kernel component: identifiers, ground-plane
//! positions, approach directions, turn intents and the vehicle class table.

use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::str::FromStr;

/// A wrapper type for vehicle IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleId(pub usize);

/// A wrapper type for obstruction IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObstructionId(pub usize);

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for ObstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obs{}", self.0)
    }
}

/// A point (or displacement) on the ground plane.
///
/// Elevation is constant across the junction, so only `x` (east) and `z`
/// (north) are tracked.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub z: f32,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0.0, z: 0.0 };

    pub fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }

    pub fn distance(&self, other: &Position) -> f32 {
        (*other - *self).length()
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.z * self.z).sqrt()
    }

    pub fn dot(&self, other: &Position) -> f32 {
        self.x * other.x + self.z * other.z
    }

    /// Unit vector in the same direction, or `None` for a zero-length vector
    pub fn normalized(&self) -> Option<Position> {
        let len = self.length();
        if len > f32::EPSILON && len.is_finite() {
            Some(Position::new(self.x / len, self.z / len))
        } else {
            None
        }
    }

    pub fn lerp(&self, other: &Position, t: f32) -> Position {
        Position {
            x: self.x + (other.x - self.x) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    /// Calculate the heading from this position to another (Y-axis rotation)
    pub fn angle_to(&self, other: &Position) -> f32 {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        if dx == 0.0 && dz == 0.0 {
            0.0
        } else {
            dx.atan2(dz)
        }
    }

    /// Unit vector for a heading produced by [`Position::angle_to`]
    pub fn from_heading(heading: f32) -> Position {
        Position::new(heading.sin(), heading.cos())
    }

    /// The vector rotated 90 degrees clockwise, i.e. the right-hand side of
    /// something travelling along it
    pub fn right(&self) -> Position {
        Position::new(self.z, -self.x)
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.z + rhs.z)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.z - rhs.z)
    }
}

impl Mul<f32> for Position {
    type Output = Position;

    fn mul(self, rhs: f32) -> Position {
        Position::new(self.x * rhs, self.z * rhs)
    }
}

impl Neg for Position {
    type Output = Position;

    fn neg(self) -> Position {
        Position::new(-self.x, -self.z)
    }
}

/// One of the four road arms feeding the junction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    /// Unit vector pointing from the junction centre out along this arm
    pub fn arm_vector(self) -> Position {
        match self {
            Direction::North => Position::new(0.0, 1.0),
            Direction::South => Position::new(0.0, -1.0),
            Direction::East => Position::new(1.0, 0.0),
            Direction::West => Position::new(-1.0, 0.0),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
        }
    }

    /// The arm a vector points along, by dominant axis
    pub fn from_vector(v: Position) -> Direction {
        if v.x.abs() > v.z.abs() {
            if v.x > 0.0 {
                Direction::East
            } else {
                Direction::West
            }
        } else if v.z > 0.0 {
            Direction::North
        } else {
            Direction::South
        }
    }

    pub fn index(self) -> usize {
        match self {
            Direction::North => 0,
            Direction::South => 1,
            Direction::East => 2,
            Direction::West => 3,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::North => "north",
            Direction::South => "south",
            Direction::East => "east",
            Direction::West => "west",
        };
        f.write_str(name)
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "n" | "north" => Ok(Direction::North),
            "s" | "south" => Ok(Direction::South),
            "e" | "east" => Ok(Direction::East),
            "w" | "west" => Ok(Direction::West),
            other => bail!("unknown direction '{}'", other),
        }
    }
}

/// The movement a vehicle makes through the junction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnIntent {
    Straight,
    Left,
    Right,
}

impl TurnIntent {
    pub const ALL: [TurnIntent; 3] = [TurnIntent::Straight, TurnIntent::Left, TurnIntent::Right];

    /// Heading after the movement, given the heading on entry (right-hand traffic)
    pub fn exit_heading(self, inbound: Position) -> Position {
        match self {
            TurnIntent::Straight => inbound,
            TurnIntent::Right => inbound.right(),
            TurnIntent::Left => -inbound.right(),
        }
    }

    /// Number of quarter turns around a counter-clockwise roundabout
    pub fn ring_quarters(self) -> usize {
        match self {
            TurnIntent::Right => 1,
            TurnIntent::Straight => 2,
            TurnIntent::Left => 3,
        }
    }
}

impl fmt::Display for TurnIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnIntent::Straight => "straight",
            TurnIntent::Left => "left",
            TurnIntent::Right => "right",
        };
        f.write_str(name)
    }
}

impl FromStr for TurnIntent {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "straight" => Ok(TurnIntent::Straight),
            "left" => Ok(TurnIntent::Left),
            "right" => Ok(TurnIntent::Right),
            other => bail!("unknown turn intent '{}'", other),
        }
    }
}

/// Type of vehicle in the simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleClass {
    Car,
    Bus,
    Truck,
}

/// Physical and performance envelope shared by every vehicle of a class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehiclePerformance {
    /// Top speed in distance units per second
    pub max_speed: f32,
    pub acceleration: f32,
    pub deceleration: f32,
    /// Nominal length, used to derive the safety following-distance
    pub length: f32,
    /// Grams of CO2 per second while stationary
    pub idle_emission_rate: f32,
    /// Grams of CO2 per distance unit travelled
    pub emission_per_unit: f32,
}

const CAR_PERFORMANCE: VehiclePerformance = VehiclePerformance {
    max_speed: 13.9,
    acceleration: 3.0,
    deceleration: 6.0,
    length: 4.5,
    idle_emission_rate: 0.6,
    emission_per_unit: 0.17,
};

const BUS_PERFORMANCE: VehiclePerformance = VehiclePerformance {
    max_speed: 11.1,
    acceleration: 1.5,
    deceleration: 4.0,
    length: 10.0,
    idle_emission_rate: 1.8,
    emission_per_unit: 0.82,
};

const TRUCK_PERFORMANCE: VehiclePerformance = VehiclePerformance {
    max_speed: 11.1,
    acceleration: 1.2,
    deceleration: 3.5,
    length: 8.0,
    idle_emission_rate: 1.5,
    emission_per_unit: 0.65,
};

impl VehicleClass {
    pub const ALL: [VehicleClass; 3] = [VehicleClass::Car, VehicleClass::Bus, VehicleClass::Truck];

    pub fn performance(self) -> &'static VehiclePerformance {
        match self {
            VehicleClass::Car => &CAR_PERFORMANCE,
            VehicleClass::Bus => &BUS_PERFORMANCE,
            VehicleClass::Truck => &TRUCK_PERFORMANCE,
        }
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VehicleClass::Car => "car",
            VehicleClass::Bus => "bus",
            VehicleClass::Truck => "truck",
        };
        f.write_str(name)
    }
}

impl FromStr for VehicleClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "car" => Ok(VehicleClass::Car),
            "bus" => Ok(VehicleClass::Bus),
            "truck" => Ok(VehicleClass::Truck),
            other => bail!("unknown vehicle class '{}'", other),
        }
    }
}

/// Safe following distance multiplier applied to the mean length of a
/// follower and its leader
pub const SAFE_FOLLOWING_MULTIPLIER: f32 = 1.5;

/// Centre-to-centre gap a follower keeps behind a leader
pub fn safety_distance(follower: VehicleClass, leader: VehicleClass, multiplier: f32) -> f32 {
    let mean_length = 0.5 * (follower.performance().length + leader.performance().length);
    mean_length * multiplier
}
