//! Z-Wave transport boundary
//!
//! The gateway never speaks the Z-Wave wire protocol itself. A [`Transport`]
//! delivers decoded value events and accepts value writes/refreshes; the rest
//! of the crate only sees [`ZWaveEvent`]s coming in and [`TransportCommand`]s
//! going out.

pub mod simulated;

pub use simulated::SimulatedTransport;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Z-Wave node identifier
pub type NodeId = u8;

/// Multilevel switch command class (shutter level)
pub const COMMAND_CLASS_SWITCH_MULTILEVEL: u8 = 0x26;
/// Meter command class (power draw)
pub const COMMAND_CLASS_METER: u8 = 0x32;
/// Multilevel switch value index carrying the level
pub const LEVEL_INDEX: u8 = 0;
/// Meter value index carrying watts
pub const WATTS_INDEX: u8 = 2;
/// Endpoint instance used for every value
pub const INSTANCE: u8 = 1;

/// Address of a single Z-Wave value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ValueId {
    pub node_id: NodeId,
    pub class_id: u8,
    pub instance: u8,
    pub index: u8,
}

impl ValueId {
    /// The multilevel level value of `node_id`
    pub fn level(node_id: NodeId) -> Self {
        Self {
            node_id,
            class_id: COMMAND_CLASS_SWITCH_MULTILEVEL,
            instance: INSTANCE,
            index: LEVEL_INDEX,
        }
    }

    /// The meter watts value of `node_id`
    pub fn watts(node_id: NodeId) -> Self {
        Self {
            node_id,
            class_id: COMMAND_CLASS_METER,
            instance: INSTANCE,
            index: WATTS_INDEX,
        }
    }
}

/// A value as reported by the transport
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueReport {
    pub class_id: u8,
    pub index: u8,
    pub label: String,
    pub value: f64,
}

impl ValueReport {
    pub fn level(level: i32) -> Self {
        Self {
            class_id: COMMAND_CLASS_SWITCH_MULTILEVEL,
            index: LEVEL_INDEX,
            label: "Level".to_string(),
            value: f64::from(level),
        }
    }

    pub fn watts(watts: f64) -> Self {
        Self {
            class_id: COMMAND_CLASS_METER,
            index: WATTS_INDEX,
            label: "Power".to_string(),
            value: watts,
        }
    }

    /// Decode this value as a shutter reading, if it is one
    pub fn reading(&self) -> Option<Reading> {
        match (self.class_id, self.index) {
            (COMMAND_CLASS_SWITCH_MULTILEVEL, LEVEL_INDEX) => {
                Some(Reading::Level(self.value.round() as i32))
            }
            (COMMAND_CLASS_METER, WATTS_INDEX) => Some(Reading::Moving(self.value > 0.0)),
            _ => None,
        }
    }
}

/// Shutter-relevant meaning of a value report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    Level(i32),
    /// Power draw above zero means the motor runs
    Moving(bool),
}

/// Identity and naming of a node, reported once it is ready
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodeReport {
    pub manufacturer_id: String,
    pub product_id: String,
    /// Node name; names the axis this node drives
    pub name: String,
    /// Node location; groups nodes into one shutter
    pub location: String,
}

/// Events delivered by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum ZWaveEvent {
    ValueAdded { node_id: NodeId, value: ValueReport },
    ValueChanged { node_id: NodeId, value: ValueReport },
    NodeReady { node_id: NodeId, info: NodeReport },
    ScanComplete,
    DriverFailed { reason: String },
}

/// Outbound commands issued by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportCommand {
    SetLevel { node_id: NodeId, level: i32 },
    RefreshLevel { node_id: NodeId },
}

/// Fire-and-forget sender for [`TransportCommand`]s
#[derive(Clone)]
pub struct TransportHandle {
    cmd_tx: mpsc::UnboundedSender<TransportCommand>,
}

impl TransportHandle {
    pub fn new(cmd_tx: mpsc::UnboundedSender<TransportCommand>) -> Self {
        Self { cmd_tx }
    }

    /// Create a handle together with the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn set_level(&self, node_id: NodeId, level: i32) {
        debug!("setLevel node={} level={}", node_id, level);
        if self
            .cmd_tx
            .send(TransportCommand::SetLevel { node_id, level })
            .is_err()
        {
            warn!("Transport closed, dropping setLevel for node {}", node_id);
        }
    }

    pub fn refresh_level(&self, node_id: NodeId) {
        if self
            .cmd_tx
            .send(TransportCommand::RefreshLevel { node_id })
            .is_err()
        {
            warn!("Transport closed, dropping refresh for node {}", node_id);
        }
    }
}

/// Transport trait - a Z-Wave controller implementation
///
/// Methods take `&self`; implementations use interior mutability.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logging
    fn name(&self) -> &str;

    /// Open the controller at `path` and start delivering events.
    ///
    /// The stream must end discovery with [`ZWaveEvent::ScanComplete`] or
    /// [`ZWaveEvent::DriverFailed`].
    async fn connect(&self, path: &str) -> Result<mpsc::Receiver<ZWaveEvent>>;

    /// Write a value
    async fn set_value(&self, value_id: ValueId, value: i32) -> Result<()>;

    /// Ask the node to report a value again
    async fn refresh_value(&self, value_id: ValueId) -> Result<()>;

    /// Close the controller
    async fn shutdown(&self) -> Result<()>;
}

/// Deliver one command to the transport
pub async fn dispatch(transport: &dyn Transport, cmd: TransportCommand) -> Result<()> {
    match cmd {
        TransportCommand::SetLevel { node_id, level } => {
            transport.set_value(ValueId::level(node_id), level).await
        }
        TransportCommand::RefreshLevel { node_id } => {
            transport.refresh_value(ValueId::level(node_id)).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_decodes_level_and_watts() {
        assert_eq!(ValueReport::level(42).reading(), Some(Reading::Level(42)));
        assert_eq!(ValueReport::watts(12.5).reading(), Some(Reading::Moving(true)));
        assert_eq!(ValueReport::watts(0.0).reading(), Some(Reading::Moving(false)));
    }

    #[test]
    fn test_reading_ignores_other_values() {
        let kwh = ValueReport {
            class_id: COMMAND_CLASS_METER,
            index: 0,
            label: "Energy".to_string(),
            value: 3.0,
        };
        assert_eq!(kwh.reading(), None);

        let other = ValueReport {
            class_id: 0x25,
            index: LEVEL_INDEX,
            label: "Switch".to_string(),
            value: 1.0,
        };
        assert_eq!(other.reading(), None);
    }

    #[tokio::test]
    async fn test_handle_sends_commands() {
        let (handle, mut rx) = TransportHandle::channel();
        handle.set_level(4, 80);
        handle.refresh_level(4);

        assert_eq!(
            rx.recv().await,
            Some(TransportCommand::SetLevel { node_id: 4, level: 80 })
        );
        assert_eq!(rx.recv().await, Some(TransportCommand::RefreshLevel { node_id: 4 }));
    }

    #[test]
    fn test_handle_survives_closed_channel() {
        let (handle, rx) = TransportHandle::channel();
        drop(rx);
        handle.set_level(1, 10);
        handle.refresh_level(1);
    }
}
