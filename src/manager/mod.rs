//! Shutter manager - node registry, discovery and telemetry routing
//!
//! The manager is the single consumer of the transport's event stream:
//! - collects node identity and telemetry until the scan completes
//! - builds one [`ShutterDevice`] per location group
//! - routes level changes to the owning device/axis
//! - polls the level of running motors through a [`RefreshScheduler`]

mod refresh;
mod registry;


pub use refresh::RefreshScheduler;
pub use registry::{parse_axis, DeviceHandle, DeviceRegistry};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use crate::config::AppConfig;
use crate::error::{Result, ShutterError};
use crate::shutter::{Axis, AxisRanges, NodeSeed, ShutterDevice, ValueCallback};
use crate::zwave::{NodeId, NodeReport, Reading, TransportHandle, ValueReport, ZWaveEvent};

/// Capacity of the accessory update broadcast
const UPDATE_BUFFER: usize = 256;

/// Settings the manager needs from the application config
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub manufacturer_id: String,
    pub product_id: String,
    pub refresh_interval: Duration,
    pub ranges: AxisRanges,
}

impl From<&AppConfig> for ManagerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            manufacturer_id: config.zwave.manufacturer_id.clone(),
            product_id: config.zwave.product_id.clone(),
            refresh_interval: Duration::from_millis(config.zwave.refresh_interval_ms),
            ranges: config.shutter,
        }
    }
}

/// Which value of an axis changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Current,
    Target,
}

/// Change notification for the accessory host
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessoryUpdate {
    pub device: String,
    pub axis: Axis,
    pub kind: UpdateKind,
    pub value: u8,
}

/// What is known about a node
#[derive(Debug, Clone, Default)]
struct NodeInfo {
    /// Axis name, from the node name
    axis: Option<String>,
    /// Group label, from the node location
    group: Option<String>,
    level: Option<i32>,
    moving: bool,
    /// Device this node was attached to after discovery
    device: Option<String>,
}

impl NodeInfo {
    fn is_recognized(&self) -> bool {
        self.group.is_some()
    }
}

pub struct ShutterManager {
    settings: ManagerSettings,
    transport: TransportHandle,
    nodes: HashMap<NodeId, NodeInfo>,
    /// Recognized nodes per group, waiting for the scan to complete
    pending: BTreeMap<String, Vec<NodeId>>,
    registry: DeviceRegistry,
    refresh: RefreshScheduler,
    updates_tx: broadcast::Sender<AccessoryUpdate>,
    discovered: bool,
}

impl ShutterManager {
    pub fn new(settings: ManagerSettings, transport: TransportHandle) -> Self {
        let refresh = RefreshScheduler::new(settings.refresh_interval, transport.clone());
        let (updates_tx, _) = broadcast::channel(UPDATE_BUFFER);
        Self {
            settings,
            transport,
            nodes: HashMap::new(),
            pending: BTreeMap::new(),
            registry: DeviceRegistry::new(),
            refresh,
            updates_tx,
            discovered: false,
        }
    }

    /// Handle to the discovered devices
    pub fn registry(&self) -> DeviceRegistry {
        self.registry.clone()
    }

    /// Subscribe to current/target changes of every device
    pub fn subscribe(&self) -> broadcast::Receiver<AccessoryUpdate> {
        self.updates_tx.subscribe()
    }

    pub fn updates_sender(&self) -> broadcast::Sender<AccessoryUpdate> {
        self.updates_tx.clone()
    }

    /// Consume events until the scan completes, then build the devices.
    ///
    /// Returns the names of the discovered devices.
    pub async fn discover(
        &mut self,
        events: &mut mpsc::Receiver<ZWaveEvent>,
    ) -> Result<Vec<String>> {
        loop {
            match events.recv().await {
                Some(ZWaveEvent::ScanComplete) => break,
                Some(ZWaveEvent::DriverFailed { reason }) => {
                    return Err(ShutterError::ConnectionFailure(reason));
                }
                Some(event) => self.handle_event(event)?,
                None => {
                    return Err(ShutterError::ConnectionFailure(
                        "event stream closed before the scan completed".to_string(),
                    ));
                }
            }
        }
        info!("Scan complete, {} group(s) found", self.pending.len());
        Ok(self.build_devices())
    }

    /// Process one transport event
    pub fn handle_event(&mut self, event: ZWaveEvent) -> Result<()> {
        match event {
            ZWaveEvent::ValueAdded { node_id, value } => {
                trace!("valueAdded node={} {} = {}", node_id, value.label, value.value);
                self.on_value(node_id, &value, false)
            }
            ZWaveEvent::ValueChanged { node_id, value } => {
                debug!("valueChanged node={} {} = {}", node_id, value.label, value.value);
                self.on_value(node_id, &value, true)
            }
            ZWaveEvent::NodeReady { node_id, info } => {
                self.on_node_ready(node_id, info);
                Ok(())
            }
            ZWaveEvent::ScanComplete => Ok(()),
            ZWaveEvent::DriverFailed { reason } => Err(ShutterError::ConnectionFailure(reason)),
        }
    }

    /// Cancel every running level poll
    pub fn shutdown(&mut self) {
        self.refresh.stop_all();
    }

    fn on_value(&mut self, node_id: NodeId, value: &ValueReport, changed: bool) -> Result<()> {
        let Some(reading) = value.reading() else {
            return Ok(());
        };

        if !changed {
            let node = self.nodes.entry(node_id).or_default();
            match reading {
                Reading::Level(level) => node.level = Some(level),
                Reading::Moving(moving) => node.moving = moving,
            }
            return Ok(());
        }

        let Some(node) = self.nodes.get_mut(&node_id) else {
            trace!("Ignoring value for unknown node {}", node_id);
            return Ok(());
        };

        match reading {
            Reading::Level(level) => {
                node.level = Some(level);
                self.route_level(node_id)
            }
            Reading::Moving(moving) => {
                node.moving = moving;
                if node.is_recognized() {
                    self.schedule_refresh(node_id, moving);
                }
                Ok(())
            }
        }
    }

    fn on_node_ready(&mut self, node_id: NodeId, info: NodeReport) {
        debug!("node {} ready", node_id);
        if info.manufacturer_id != self.settings.manufacturer_id
            || info.product_id != self.settings.product_id
        {
            debug!(
                "Ignoring node {} ({}/{}): not a shutter",
                node_id, info.manufacturer_id, info.product_id
            );
            return;
        }

        if self.discovered {
            warn!(
                "Node {} ({} / {}) became ready after discovery, ignoring",
                node_id, info.location, info.name
            );
            return;
        }

        let node = self.nodes.entry(node_id).or_default();
        node.axis = Some(info.name);
        node.group = Some(info.location.clone());
        let members = self.pending.entry(info.location).or_default();
        if !members.contains(&node_id) {
            members.push(node_id);
        }
    }

    fn build_devices(&mut self) -> Vec<String> {
        let pending = std::mem::take(&mut self.pending);
        let mut names = Vec::with_capacity(pending.len());

        for (group, node_ids) in pending {
            let seeds: Vec<NodeSeed> = node_ids
                .iter()
                .filter_map(|id| {
                    let node = self.nodes.get(id)?;
                    Some(NodeSeed {
                        axis: node.axis.clone().unwrap_or_default(),
                        node_id: *id,
                        level: node.level,
                        moving: node.moving,
                    })
                })
                .collect();

            let mut device = ShutterDevice::new(
                group.clone(),
                self.settings.ranges,
                &seeds,
                self.transport.clone(),
            );
            let (current, target) = self.callbacks(&group);
            device.set_update_callbacks(current, target);
            self.registry.insert(device);

            for id in &node_ids {
                if let Some(node) = self.nodes.get_mut(id) {
                    node.device = Some(group.clone());
                }
            }
            names.push(group);
        }

        self.discovered = true;
        names
    }

    fn callbacks(&self, group: &str) -> (ValueCallback, ValueCallback) {
        let make = |kind: UpdateKind| -> ValueCallback {
            let tx = self.updates_tx.clone();
            let device = group.to_string();
            Arc::new(move |axis: Axis, value: u8| {
                debug!("{} {:?} {} -> {}", device, kind, axis, value);
                // No subscribers is fine
                let _ = tx.send(AccessoryUpdate {
                    device: device.clone(),
                    axis,
                    kind,
                    value,
                });
            })
        };
        (make(UpdateKind::Current), make(UpdateKind::Target))
    }

    fn route_level(&self, node_id: NodeId) -> Result<()> {
        let Some(node) = self.nodes.get(&node_id) else {
            return Ok(());
        };
        let (Some(group), Some(level)) = (&node.device, node.level) else {
            return Ok(());
        };

        let axis_name = node.axis.as_deref().unwrap_or_default();
        let axis = parse_axis(group, axis_name).inspect_err(|e| warn!("{}", e))?;
        self.registry
            .device(group)?
            .lock()
            .update(axis, level, node.moving);
        Ok(())
    }

    fn schedule_refresh(&mut self, node_id: NodeId, moving: bool) {
        if moving {
            self.refresh.start(node_id);
        } else if self.refresh.stop(node_id) {
            // One last read to pick up where the motor stopped
            self.transport.refresh_level(node_id);
        }
    }
}
