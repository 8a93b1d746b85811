//! User-placed obstructions and their effect on traffic

use anyhow::bail;
use log::info;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::path::JunctionGeometry;
use super::types::{Direction, ObstructionId, Position};

/// What an obstruction does to vehicles inside its influence radius
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObstructionEffect {
    /// Fraction of top speed lost, in [0, 1)
    pub speed_reduction: f32,
    /// Fraction of approach capacity lost, in [0, 1); consumed by spawning
    pub capacity_reduction: f32,
    /// Vehicles inside the zone must stop
    pub blocked: bool,
}

const POTHOLE_EFFECT: ObstructionEffect = ObstructionEffect {
    speed_reduction: 0.5,
    capacity_reduction: 0.0,
    blocked: false,
};

const BARRICADE_EFFECT: ObstructionEffect = ObstructionEffect {
    speed_reduction: 0.0,
    capacity_reduction: 0.0,
    blocked: true,
};

const VENDOR_EFFECT: ObstructionEffect = ObstructionEffect {
    speed_reduction: 0.3,
    capacity_reduction: 0.5,
    blocked: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObstructionKind {
    Pothole,
    Barricade,
    VendorEncroachment,
}

impl ObstructionKind {
    pub const ALL: [ObstructionKind; 3] = [
        ObstructionKind::Pothole,
        ObstructionKind::Barricade,
        ObstructionKind::VendorEncroachment,
    ];

    pub fn effect(self) -> ObstructionEffect {
        match self {
            ObstructionKind::Pothole => POTHOLE_EFFECT,
            ObstructionKind::Barricade => BARRICADE_EFFECT,
            ObstructionKind::VendorEncroachment => VENDOR_EFFECT,
        }
    }

    /// Extent along the road used when the caller gives none
    pub fn default_length(self) -> f32 {
        match self {
            ObstructionKind::Pothole => 8.0,
            ObstructionKind::Barricade => 20.0,
            ObstructionKind::VendorEncroachment => 16.0,
        }
    }
}

impl fmt::Display for ObstructionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObstructionKind::Pothole => "pothole",
            ObstructionKind::Barricade => "barricade",
            ObstructionKind::VendorEncroachment => "vendor-encroachment",
        };
        f.write_str(name)
    }
}

impl FromStr for ObstructionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pothole" => Ok(ObstructionKind::Pothole),
            "barricade" => Ok(ObstructionKind::Barricade),
            "vendor" | "vendor-encroachment" => Ok(ObstructionKind::VendorEncroachment),
            other => bail!("unknown obstruction type '{}'", other),
        }
    }
}

/// A hazard placed on the road
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Obstruction {
    pub id: ObstructionId,
    pub kind: ObstructionKind,
    pub position: Position,
    /// Radius of the circular influence zone
    pub radius: f32,
    /// Arm the obstruction sits on; `None` inside the junction box
    pub approach: Option<Direction>,
}

impl Obstruction {
    pub fn effect(&self) -> ObstructionEffect {
        self.kind.effect()
    }

    pub fn contains(&self, position: Position) -> bool {
        self.position.distance(&position) <= self.radius
    }

    /// Distance along a straight segment to where it first enters the zone.
    ///
    /// `direction` must be a unit vector. Returns zero when `start` is
    /// already inside and `None` when the segment misses the zone.
    pub fn entry_distance(
        &self,
        start: Position,
        direction: Position,
        length: f32,
    ) -> Option<f32> {
        let offset = start - self.position;
        let outside = offset.dot(&offset) - self.radius * self.radius;
        if outside <= 0.0 {
            return Some(0.0);
        }
        let along = direction.dot(&offset);
        let discriminant = along * along - outside;
        if discriminant < 0.0 {
            return None;
        }
        let entry = -along - discriminant.sqrt();
        (0.0..=length).contains(&entry).then_some(entry)
    }
}

/// Why a placement request was refused
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementError {
    /// The coordinate is not on a drivable lane
    OffRoad { x: f32, z: f32 },
    /// The requested extent is not a positive, finite length
    InvalidSize(f32),
}

impl fmt::Display for PlacementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementError::OffRoad { x, z } => {
                write!(f, "position ({:.1}, {:.1}) is not on a valid road lane", x, z)
            }
            PlacementError::InvalidSize(length) => {
                write!(f, "obstruction length {} must be positive", length)
            }
        }
    }
}

impl std::error::Error for PlacementError {}

/// The set of obstructions currently on the road
#[derive(Debug, Clone, Default)]
pub struct ObstructionField {
    geometry: JunctionGeometry,
    obstructions: BTreeMap<ObstructionId, Obstruction>,
    next_id: usize,
}

impl ObstructionField {
    pub fn new(geometry: JunctionGeometry) -> Self {
        Self {
            geometry,
            obstructions: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// Place an obstruction with its kind's default extent
    pub fn place(
        &mut self,
        position: Position,
        kind: ObstructionKind,
    ) -> Result<Obstruction, PlacementError> {
        self.place_with_length(position, kind, kind.default_length())
    }

    pub fn place_with_length(
        &mut self,
        position: Position,
        kind: ObstructionKind,
        length: f32,
    ) -> Result<Obstruction, PlacementError> {
        if !self.geometry.is_on_road(position) {
            return Err(PlacementError::OffRoad {
                x: position.x,
                z: position.z,
            });
        }
        if !length.is_finite() || length <= 0.0 {
            return Err(PlacementError::InvalidSize(length));
        }

        let id = ObstructionId(self.next_id);
        self.next_id += 1;

        let obstruction = Obstruction {
            id,
            kind,
            position,
            radius: length / 2.0,
            approach: self.geometry.approach_of(position),
        };
        let effect = kind.effect();
        info!(
            "Placed {} {} at ({:.1}, {:.1}) on {}: speed -{:.0}%, capacity -{:.0}%{}",
            kind,
            id,
            position.x,
            position.z,
            obstruction
                .approach
                .map_or_else(|| "junction".to_string(), |d| format!("{} approach", d)),
            effect.speed_reduction * 100.0,
            effect.capacity_reduction * 100.0,
            if effect.blocked { ", lane blocked" } else { "" }
        );
        self.obstructions.insert(id, obstruction);
        Ok(obstruction)
    }

    pub fn remove(&mut self, id: ObstructionId) -> Option<Obstruction> {
        let removed = self.obstructions.remove(&id);
        if let Some(obstruction) = &removed {
            info!("Removed {} {}", obstruction.kind, id);
        }
        removed
    }

    /// Remove every obstruction, returning how many there were
    pub fn clear(&mut self) -> usize {
        let count = self.obstructions.len();
        self.obstructions.clear();
        if count > 0 {
            info!("All obstructions cleared ({})", count);
        }
        count
    }

    pub fn get(&self, id: ObstructionId) -> Option<&Obstruction> {
        self.obstructions.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Obstruction> {
        self.obstructions.values()
    }

    pub fn len(&self) -> usize {
        self.obstructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstructions.is_empty()
    }

    pub fn geometry(&self) -> &JunctionGeometry {
        &self.geometry
    }

    /// Obstructions whose influence zone contains the position
    pub fn affecting(&self, position: Position) -> impl Iterator<Item = &Obstruction> {
        self.iter().filter(move |o| o.contains(position))
    }

    pub fn is_blocked_at(&self, position: Position) -> bool {
        self.affecting(position).any(|o| o.effect().blocked)
    }

    /// Distance along `route` to the edge of the first blocked zone it enters,
    /// searching no further than `horizon`
    pub fn first_blocked_along(&self, route: &[Position], horizon: f32) -> Option<f32> {
        let mut travelled = 0.0;
        for leg in route.windows(2) {
            if travelled > horizon {
                break;
            }
            let offset = leg[1] - leg[0];
            let length = offset.length();
            if let Some(direction) = offset.normalized() {
                let entry = self
                    .iter()
                    .filter(|o| o.effect().blocked)
                    .filter_map(|o| o.entry_distance(leg[0], direction, length))
                    .min_by_key(|distance| OrderedFloat(*distance));
                if let Some(entry) = entry {
                    let distance = travelled + entry;
                    return (distance <= horizon).then_some(distance);
                }
            }
            travelled += length;
        }
        None
    }

    /// Compound speed factor of every non-blocking zone containing the position
    pub fn speed_factor_at(&self, position: Position) -> f32 {
        self.affecting(position)
            .map(|o| o.effect())
            .filter(|e| !e.blocked)
            .map(|e| 1.0 - e.speed_reduction)
            .product()
    }

    /// Worst capacity reduction among obstructions on an approach
    pub fn capacity_reduction_on(&self, approach: Direction) -> f32 {
        self.iter()
            .filter(|o| o.approach == Some(approach))
            .map(|o| o.effect().capacity_reduction)
            .fold(0.0, f32::max)
    }
}
