//! Qubino shutter gateway library
//!
//! Turns Z-Wave multilevel/meter telemetry of Qubino shutters into normalized
//! window coverings with a position axis and a linked tilt axis.

pub mod api;
pub mod config;
pub mod error;
pub mod manager;
pub mod range;
pub mod shutter;
pub mod zwave;
