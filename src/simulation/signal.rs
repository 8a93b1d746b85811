//! Signal controller for the junction
//!
//! A fixed five-phase cycle: north-south green, yellow, an all-red
//! clearance, then east-west green and yellow. Only the durations change at
//! runtime, never the cycle itself.

use anyhow::{bail, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::metrics::QueueLengths;
use super::types::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalColor {
    Green,
    Yellow,
    Red,
}

/// The two perpendicular movements that share the junction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalGroup {
    NorthSouth,
    EastWest,
}

impl SignalGroup {
    pub fn for_direction(direction: Direction) -> SignalGroup {
        match direction {
            Direction::North | Direction::South => SignalGroup::NorthSouth,
            Direction::East | Direction::West => SignalGroup::EastWest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalPhase {
    NsGreen,
    NsYellow,
    AllRed,
    EwGreen,
    EwYellow,
}

impl SignalPhase {
    pub const CYCLE: [SignalPhase; 5] = [
        SignalPhase::NsGreen,
        SignalPhase::NsYellow,
        SignalPhase::AllRed,
        SignalPhase::EwGreen,
        SignalPhase::EwYellow,
    ];

    pub fn next(self) -> SignalPhase {
        match self {
            SignalPhase::NsGreen => SignalPhase::NsYellow,
            SignalPhase::NsYellow => SignalPhase::AllRed,
            SignalPhase::AllRed => SignalPhase::EwGreen,
            SignalPhase::EwGreen => SignalPhase::EwYellow,
            SignalPhase::EwYellow => SignalPhase::NsGreen,
        }
    }

    /// Colors shown as (north-south, east-west)
    pub fn colors(self) -> (SignalColor, SignalColor) {
        match self {
            SignalPhase::NsGreen => (SignalColor::Green, SignalColor::Red),
            SignalPhase::NsYellow => (SignalColor::Yellow, SignalColor::Red),
            SignalPhase::AllRed => (SignalColor::Red, SignalColor::Red),
            SignalPhase::EwGreen => (SignalColor::Red, SignalColor::Green),
            SignalPhase::EwYellow => (SignalColor::Red, SignalColor::Yellow),
        }
    }

    pub fn color_for(self, group: SignalGroup) -> SignalColor {
        let (ns, ew) = self.colors();
        match group {
            SignalGroup::NorthSouth => ns,
            SignalGroup::EastWest => ew,
        }
    }
}

/// Phase durations in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalTimings {
    pub ns_green: f32,
    pub ns_yellow: f32,
    pub all_red: f32,
    pub ew_green: f32,
    pub ew_yellow: f32,
}

impl Default for SignalTimings {
    fn default() -> Self {
        Self {
            ns_green: 30.0,
            ns_yellow: 3.0,
            all_red: 2.0,
            ew_green: 30.0,
            ew_yellow: 3.0,
        }
    }
}

impl SignalTimings {
    pub fn duration(&self, phase: SignalPhase) -> f32 {
        match phase {
            SignalPhase::NsGreen => self.ns_green,
            SignalPhase::NsYellow => self.ns_yellow,
            SignalPhase::AllRed => self.all_red,
            SignalPhase::EwGreen => self.ew_green,
            SignalPhase::EwYellow => self.ew_yellow,
        }
    }

    pub fn cycle_length(&self) -> f32 {
        SignalPhase::CYCLE.iter().map(|p| self.duration(*p)).sum()
    }

    pub fn validate(&self) -> Result<()> {
        for phase in SignalPhase::CYCLE {
            let duration = self.duration(phase);
            if !duration.is_finite() || duration <= 0.0 {
                bail!("{:?} duration must be positive, got {}", phase, duration);
            }
        }
        Ok(())
    }
}

/// Bounds for queue-driven green re-timing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptivePolicy {
    /// Queue difference between groups before any change is made
    pub imbalance_threshold: usize,
    /// Seconds moved between the two greens per adjustment
    pub step: f32,
    pub min_green: f32,
    pub max_green: f32,
}

impl Default for AdaptivePolicy {
    fn default() -> Self {
        Self {
            imbalance_threshold: 3,
            step: 5.0,
            min_green: 10.0,
            max_green: 60.0,
        }
    }
}

impl AdaptivePolicy {
    /// Grow a green by one step up to `max_green`; a green already past the
    /// bound is left alone
    fn lengthen(&self, green: f32) -> f32 {
        (green + self.step).min(self.max_green.max(green))
    }

    /// Shrink a green by one step down to `min_green`; a green already under
    /// the bound is left alone
    fn shorten(&self, green: f32) -> f32 {
        (green - self.step).max(self.min_green.min(green))
    }
}

/// Timed state machine owning the junction's right of way
#[derive(Debug, Clone)]
pub struct SignalController {
    phase: SignalPhase,
    countdown: f32,
    timings: SignalTimings,
    cycles: u64,
}

impl Default for SignalController {
    fn default() -> Self {
        Self::new(SignalTimings::default())
    }
}

impl SignalController {
    pub fn new(timings: SignalTimings) -> Self {
        Self {
            phase: SignalPhase::NsGreen,
            countdown: timings.ns_green,
            timings,
            cycles: 0,
        }
    }

    pub fn phase(&self) -> SignalPhase {
        self.phase
    }

    /// Seconds left in the current phase
    pub fn countdown(&self) -> f32 {
        self.countdown
    }

    pub fn timings(&self) -> &SignalTimings {
        &self.timings
    }

    /// Completed full cycles
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn colors(&self) -> (SignalColor, SignalColor) {
        self.phase.colors()
    }

    pub fn color_for(&self, direction: Direction) -> SignalColor {
        self.phase.color_for(SignalGroup::for_direction(direction))
    }

    /// Whether traffic entering from `direction` may cross the stop line
    pub fn allows(&self, direction: Direction) -> bool {
        self.color_for(direction) == SignalColor::Green
    }

    /// Advance the countdown; moves at most one phase per call.
    /// Returns true when the phase changed.
    pub fn tick(&mut self, delta_secs: f32) -> bool {
        self.countdown -= delta_secs;
        if self.countdown > 0.0 {
            return false;
        }

        self.phase = self.phase.next();
        self.countdown = self.timings.duration(self.phase);
        if self.phase == SignalPhase::NsGreen {
            self.cycles += 1;
        }
        debug!(
            "Signal -> {:?} for {:.1}s (cycle {})",
            self.phase, self.countdown, self.cycles
        );
        true
    }

    /// Replace the duration table. The running phase keeps its remaining
    /// time unless the new duration is shorter.
    pub fn set_timings(&mut self, timings: SignalTimings) -> Result<()> {
        timings.validate()?;
        self.timings = timings;
        self.countdown = self.countdown.min(timings.duration(self.phase));
        info!(
            "Signal timings set: NS {:.0}/{:.0}s, EW {:.0}/{:.0}s, all-red {:.0}s",
            timings.ns_green,
            timings.ns_yellow,
            timings.ew_green,
            timings.ew_yellow,
            timings.all_red
        );
        Ok(())
    }

    /// Shift green time toward the more congested group.
    /// Returns true when the timings changed.
    pub fn optimize(&mut self, queues: &QueueLengths, policy: &AdaptivePolicy) -> bool {
        let ns = queues.north_south();
        let ew = queues.east_west();

        let mut timings = self.timings;
        if ns >= ew + policy.imbalance_threshold {
            timings.ns_green = policy.lengthen(timings.ns_green);
            timings.ew_green = policy.shorten(timings.ew_green);
        } else if ew >= ns + policy.imbalance_threshold {
            timings.ew_green = policy.lengthen(timings.ew_green);
            timings.ns_green = policy.shorten(timings.ns_green);
        } else {
            return false;
        }

        if timings == self.timings {
            return false;
        }
        info!(
            "Signal optimization: queues NS={} EW={}, green NS {:.0}->{:.0}s, EW {:.0}->{:.0}s",
            ns,
            ew,
            self.timings.ns_green,
            timings.ns_green,
            self.timings.ew_green,
            timings.ew_green
        );
        self.timings = timings;
        self.countdown = self.countdown.min(timings.duration(self.phase));
        true
    }
}
