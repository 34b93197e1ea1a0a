//! Two-state motion machine used to infer unreported movement targets.
//!
//! The actuator only reports its level and whether it draws power. When a move
//! is started outside of this gateway (wall switch, another controller) the
//! target is unknown, so it is inferred from the telemetry:
//!
//! | from     | sample                     | guard                 | inferred target |
//! |----------|----------------------------|-----------------------|-----------------|
//! | Moving   | stopped                    | `current != target`   | `current`       |
//! | Stopped  | stopped                    | -                     | none            |
//! | any      | moving, `current > prev`   | `target < current`    | native max      |
//! | any      | moving, `current < prev`   | `target > current`    | native min      |
//! | any      | moving                     | `current == target`   | none            |

use serde::Serialize;

use crate::range::ValueRange;

/// Movement state of one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MotionState {
    #[default]
    Stopped,
    Moving,
}

/// Target implied by a telemetry sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inference {
    /// The actuator stopped somewhere other than the known target
    SettledAt(i32),
    /// Travelling up past a stale target
    RisingToMax,
    /// Travelling down past a stale target
    FallingToMin,
}

impl Inference {
    /// Native target value for this inference
    pub fn resolve(self, range: ValueRange) -> i32 {
        match self {
            Inference::SettledAt(level) => level,
            Inference::RisingToMax => range.max,
            Inference::FallingToMin => range.min,
        }
    }
}

/// Result of feeding one sample into the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: MotionState,
    pub inference: Option<Inference>,
}

/// One telemetry sample, in native units
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub previous: i32,
    pub current: i32,
    pub target: i32,
    pub moving: bool,
}

impl MotionState {
    pub fn from_flag(moving: bool) -> Self {
        if moving {
            MotionState::Moving
        } else {
            MotionState::Stopped
        }
    }

    pub fn is_moving(self) -> bool {
        self == MotionState::Moving
    }

    /// Apply a sample and return the next state with any inferred target
    pub fn step(self, sample: Sample) -> Transition {
        let next = MotionState::from_flag(sample.moving);
        let inference = match next {
            MotionState::Stopped => Self::on_stopped(self, sample),
            MotionState::Moving => Self::on_moving(sample),
        };
        Transition { next, inference }
    }

    fn on_stopped(from: MotionState, s: Sample) -> Option<Inference> {
        (from.is_moving() && s.current != s.target).then_some(Inference::SettledAt(s.current))
    }

    fn on_moving(s: Sample) -> Option<Inference> {
        if s.current == s.target {
            return None;
        }
        if s.current > s.previous && s.target < s.current {
            Some(Inference::RisingToMax)
        } else if s.current < s.previous && s.target > s.current {
            Some(Inference::FallingToMin)
        } else {
            None
        }
    }
}
