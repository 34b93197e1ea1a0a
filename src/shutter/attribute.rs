//! A single axis of motion (position or tilt angle)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::motion::MotionState;
use crate::range::{to_native, to_normalized, ValueRange};
use crate::zwave::NodeId;

/// Controllable dimension of a shutter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Position,
    Angle,
}

impl Axis {
    pub const ALL: [Axis; 2] = [Axis::Position, Axis::Angle];

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Position => "position",
            Axis::Angle => "angle",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "position" => Ok(Axis::Position),
            "angle" => Ok(Axis::Angle),
            other => Err(other.to_string()),
        }
    }
}

/// Which stored value of an attribute to read or write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Current,
    Target,
}

/// One physical axis of the shutter.
///
/// `current` and `target` are kept in native units. The public boundary only
/// ever sees them through [`Attribute::get_value`] / [`Attribute::set_value`].
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: Axis,
    pub range: ValueRange,
    /// Transport node backing this axis, once telemetry has been seen
    pub node_id: Option<NodeId>,
    pub current: i32,
    pub target: i32,
    pub motion: MotionState,
    /// Dependent axis driven by the same actuator
    pub linked: Option<Axis>,
}

impl Attribute {
    pub fn new(name: Axis, range: ValueRange, linked: Option<Axis>) -> Self {
        Self {
            name,
            range,
            node_id: None,
            current: 0,
            target: 0,
            motion: MotionState::Stopped,
            linked,
        }
    }

    /// Store a normalized value into `field`, converted to native units
    pub fn set_value(&mut self, field: Field, normalized: u8) {
        let native = to_native(normalized, self.range);
        match field {
            Field::Current => self.current = native,
            Field::Target => self.target = native,
        }
    }

    /// Read `field` back on the normalized scale
    pub fn get_value(&self, field: Field) -> u8 {
        let native = match field {
            Field::Current => self.current,
            Field::Target => self.target,
        };
        to_normalized(native, self.range)
    }

    pub fn is_moving(&self) -> bool {
        self.motion.is_moving()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_parse() {
        assert_eq!("position".parse::<Axis>(), Ok(Axis::Position));
        assert_eq!("angle".parse::<Axis>(), Ok(Axis::Angle));
        assert_eq!("tilt".parse::<Axis>(), Err("tilt".to_string()));
        assert_eq!(Axis::Angle.to_string(), "angle");
    }

    #[test]
    fn test_values_go_through_the_mapper() {
        let mut angle = Attribute::new(Axis::Angle, ValueRange::new(-90, 90), None);

        angle.set_value(Field::Target, 99);
        assert_eq!(angle.target, 90);
        assert_eq!(angle.get_value(Field::Target), 99);

        angle.set_value(Field::Current, 0);
        assert_eq!(angle.current, -90);
        assert_eq!(angle.get_value(Field::Current), 0);
    }

    #[test]
    fn test_fresh_attribute_is_stopped_and_unbound() {
        let position = Attribute::new(Axis::Position, ValueRange::new(0, 100), Some(Axis::Angle));
        assert_eq!(position.node_id, None);
        assert!(!position.is_moving());
        assert_eq!(position.linked, Some(Axis::Angle));
        assert_eq!(position.get_value(Field::Current), 0);
    }
}
