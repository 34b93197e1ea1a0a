//! Error types for the shutter engine and device registry

use thiserror::Error;

use crate::range::LEVEL_MAX;

/// Errors surfaced by discovery, routing and the accessory boundary
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShutterError {
    /// The controller could not be opened or failed during discovery
    #[error("Z-Wave connection failed: {0}")]
    ConnectionFailure(String),

    /// A node or request names an axis the engine does not have
    #[error("device '{device}' has no attribute '{axis}'")]
    MissingAttributeMapping { device: String, axis: String },

    /// No shutter with this group name was discovered
    #[error("unknown device '{0}'")]
    UnknownDevice(String),

    /// A normalized value outside 0..=99
    #[error("level {0} is outside 0..={max}", max = LEVEL_MAX)]
    InvalidLevel(i64),
}

pub type Result<T> = std::result::Result<T, ShutterError>;
