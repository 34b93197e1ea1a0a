//! Shutter state engine - position/tilt inference for a Qubino shutter group
//!
//! A [`ShutterDevice`] represents one logical window covering (all nodes sharing
//! a location label). It owns the two axes, turns raw telemetry into
//! normalized current/target values, infers targets the device never reports,
//! and drives the tilt axis when a position command passes it.

mod attribute;
mod motion;


pub use attribute::{Attribute, Axis, Field};
pub use motion::{Inference, MotionState, Sample, Transition};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::range::ValueRange;
use crate::zwave::{NodeId, TransportHandle};

/// Callback invoked with `(axis, normalized value)` on every change
pub type ValueCallback = Arc<dyn Fn(Axis, u8) + Send + Sync>;

/// Native ranges for both axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct AxisRanges {
    #[serde(default = "default_position_range")]
    pub position: ValueRange,
    #[serde(default = "default_angle_range")]
    pub angle: ValueRange,
}

impl Default for AxisRanges {
    fn default() -> Self {
        Self {
            position: default_position_range(),
            angle: default_angle_range(),
        }
    }
}

fn default_position_range() -> ValueRange {
    ValueRange::new(0, 100)
}

fn default_angle_range() -> ValueRange {
    ValueRange::new(-90, 90)
}

/// Telemetry observed for one node before its device exists
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSeed {
    /// Axis name as reported by the node (its Z-Wave node name)
    pub axis: String,
    pub node_id: NodeId,
    pub level: Option<i32>,
    pub moving: bool,
}

/// Normalized view of one axis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisSnapshot {
    pub axis: Axis,
    pub node_id: Option<NodeId>,
    pub current: u8,
    pub target: u8,
    pub motion: MotionState,
}

/// Normalized view of a whole device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub name: String,
    pub axes: Vec<AxisSnapshot>,
}

/// Window covering with a position axis and a linked tilt axis
pub struct ShutterDevice {
    name: String,
    position: Attribute,
    angle: Attribute,
    transport: TransportHandle,
    on_current: Option<ValueCallback>,
    on_target: Option<ValueCallback>,
}

impl ShutterDevice {
    /// Build a device and seed its axes from already observed telemetry.
    ///
    /// Seeds are raw native levels, so they bypass the range mapper. Seeds for
    /// an axis name other than `position`/`angle` are skipped.
    pub fn new(
        name: impl Into<String>,
        ranges: AxisRanges,
        seeds: &[NodeSeed],
        transport: TransportHandle,
    ) -> Self {
        let mut device = Self {
            name: name.into(),
            position: Attribute::new(Axis::Position, ranges.position, Some(Axis::Angle)),
            angle: Attribute::new(Axis::Angle, ranges.angle, None),
            transport,
            on_current: None,
            on_target: None,
        };

        for seed in seeds {
            let Ok(axis) = seed.axis.parse::<Axis>() else {
                warn!(
                    "Device '{}': node {} reports unknown axis '{}', skipping",
                    device.name, seed.node_id, seed.axis
                );
                continue;
            };
            let attr = device.attr_mut(axis);
            let level = seed.level.unwrap_or(0);
            attr.node_id = Some(seed.node_id);
            attr.current = level;
            attr.target = level;
            attr.motion = MotionState::from_flag(seed.moving);
        }

        info!(
            "Created shutter '{}' (position node {:?}, angle node {:?})",
            device.name, device.position.node_id, device.angle.node_id
        );
        device
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr(&self, axis: Axis) -> &Attribute {
        match axis {
            Axis::Position => &self.position,
            Axis::Angle => &self.angle,
        }
    }

    fn attr_mut(&mut self, axis: Axis) -> &mut Attribute {
        match axis {
            Axis::Position => &mut self.position,
            Axis::Angle => &mut self.angle,
        }
    }

    /// Register the change callbacks reported to the accessory host
    pub fn set_update_callbacks(&mut self, current: ValueCallback, target: ValueCallback) {
        self.on_current = Some(current);
        self.on_target = Some(target);
    }

    pub fn get_current(&self, axis: Axis) -> u8 {
        let value = self.attr(axis).get_value(Field::Current);
        debug!("{} getCurrent {} = {}", self.name, axis, value);
        value
    }

    pub fn get_target(&self, axis: Axis) -> u8 {
        let value = self.attr(axis).get_value(Field::Target);
        debug!("{} getTarget {} = {}", self.name, axis, value);
        value
    }

    /// Command a new normalized target for `axis`.
    ///
    /// When the axis has a linked axis whose current level is below the new
    /// native target, the linked axis is driven to the same native level.
    pub fn set_target(&mut self, axis: Axis, value: u8) {
        info!("{} setTarget {} = {}", self.name, axis, value);

        let attr = self.attr_mut(axis);
        attr.set_value(Field::Target, value);
        let (node_id, target, linked) = (attr.node_id, attr.target, attr.linked);
        self.send_level(axis, node_id, target);

        let Some(linked_axis) = linked else {
            return;
        };
        let linked_attr = self.attr_mut(linked_axis);
        if linked_attr.current >= target {
            return;
        }
        linked_attr.target = target;
        let normalized = linked_attr.get_value(Field::Target);
        let linked_node = linked_attr.node_id;

        debug!(
            "{} {} target {} drives linked {} to {}",
            self.name, axis, target, linked_axis, target
        );
        self.notify_target(linked_axis, normalized);
        self.send_level(linked_axis, linked_node, target);
    }

    /// Feed one telemetry sample (native level and moving flag) for `axis`
    pub fn update(&mut self, axis: Axis, level: i32, moving: bool) {
        let attr = self.attr_mut(axis);
        let previous = attr.current;
        let transition = attr.motion.step(Sample {
            previous,
            current: level,
            target: attr.target,
            moving,
        });

        attr.current = level;
        attr.motion = transition.next;
        let current = attr.get_value(Field::Current);

        let inferred = transition.inference.map(|inference| {
            attr.target = inference.resolve(attr.range);
            (inference, attr.target, attr.get_value(Field::Target))
        });

        if previous != level {
            self.notify_current(axis, current);
        }

        if let Some((inference, native, normalized)) = inferred {
            info!(
                "{} inferring {} target {:?} -> {} (normalized {})",
                self.name, axis, inference, native, normalized
            );
            self.notify_target(axis, normalized);
        }
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            name: self.name.clone(),
            axes: Axis::ALL
                .iter()
                .map(|&axis| {
                    let attr = self.attr(axis);
                    AxisSnapshot {
                        axis,
                        node_id: attr.node_id,
                        current: attr.get_value(Field::Current),
                        target: attr.get_value(Field::Target),
                        motion: attr.motion,
                    }
                })
                .collect(),
        }
    }

    fn send_level(&self, axis: Axis, node_id: Option<NodeId>, level: i32) {
        match node_id {
            Some(node_id) => self.transport.set_level(node_id, level),
            None => warn!("{}: no node bound to {}, dropping level {}", self.name, axis, level),
        }
    }

    fn notify_current(&self, axis: Axis, value: u8) {
        if let Some(cb) = &self.on_current {
            cb(axis, value);
        }
    }

    fn notify_target(&self, axis: Axis, value: u8) {
        if let Some(cb) = &self.on_target {
            cb(axis, value);
        }
    }
}
