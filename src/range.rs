//! Range mapping between device-native units and the normalized 0-99 scale.
//!
//! Every public get/set on a shutter axis speaks the normalized scale, while
//! the engine stores values in the axis' native units (e.g. -90..90 for tilt).
//! Both directions go through [`interpolate`], so the two representations
//! never drift apart.

use serde::{Deserialize, Serialize};

/// Lowest normalized level
pub const LEVEL_MIN: i32 = 0;

/// Highest normalized level
pub const LEVEL_MAX: i32 = 99;

/// Closed integer range `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ValueRange {
    pub min: i32,
    pub max: i32,
}

impl ValueRange {
    /// The canonical normalized range used at the public boundary
    pub const NORMALIZED: ValueRange = ValueRange {
        min: LEVEL_MIN,
        max: LEVEL_MAX,
    };

    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    /// True when `min < max`
    pub fn is_valid(&self) -> bool {
        self.min < self.max
    }

    pub fn contains(&self, value: i32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Clamped linear interpolation from `src` into `dst`.
///
/// An absent value is treated as `0`. Inputs at or beyond either end of `src`
/// map exactly to the corresponding end of `dst`; everything in between is
/// rounded to the nearest integer (ties away from zero).
///
/// # Example
/// ```
/// use qubino_shutter_gw::range::{interpolate, ValueRange};
///
/// let tilt = ValueRange::new(-90, 90);
/// assert_eq!(interpolate(Some(0), tilt, ValueRange::NORMALIZED), 50);
/// assert_eq!(interpolate(Some(-120), tilt, ValueRange::NORMALIZED), 0);
/// assert_eq!(interpolate(None, ValueRange::NORMALIZED, tilt), -90);
/// ```
pub fn interpolate(value: Option<i32>, src: ValueRange, dst: ValueRange) -> i32 {
    let value = value.unwrap_or(0);

    if value <= src.min {
        return dst.min;
    }
    if value >= src.max {
        return dst.max;
    }

    // Spans of wide ranges do not fit in i32
    let offset = (f64::from(value) - f64::from(src.min))
        * (f64::from(dst.max) - f64::from(dst.min))
        / (f64::from(src.max) - f64::from(src.min));
    (f64::from(dst.min) + offset.round()) as i32
}

/// Map a native value onto the normalized 0-99 scale
pub fn to_normalized(value: i32, native: ValueRange) -> u8 {
    interpolate(Some(value), native, ValueRange::NORMALIZED) as u8
}

/// Map a normalized 0-99 value into `native` units
pub fn to_native(normalized: u8, native: ValueRange) -> i32 {
    interpolate(Some(i32::from(normalized)), ValueRange::NORMALIZED, native)
}
