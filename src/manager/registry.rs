//! Device registry - shared lookup of discovered shutters by group name

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{Result, ShutterError};
use crate::range::LEVEL_MAX;
use crate::shutter::{Axis, DeviceSnapshot, ShutterDevice};

/// One lock per device; devices share no state
pub type DeviceHandle = Arc<Mutex<ShutterDevice>>;

/// Cloneable handle to the set of discovered devices
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    devices: Arc<RwLock<BTreeMap<String, DeviceHandle>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, device: ShutterDevice) -> DeviceHandle {
        let name = device.name().to_string();
        let handle = Arc::new(Mutex::new(device));
        self.devices.write().insert(name, handle.clone());
        handle
    }

    pub fn device(&self, name: &str) -> Result<DeviceHandle> {
        self.devices
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ShutterError::UnknownDevice(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.devices.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.read().is_empty()
    }

    pub fn snapshot(&self, name: &str) -> Result<DeviceSnapshot> {
        Ok(self.device(name)?.lock().snapshot())
    }

    pub fn snapshots(&self) -> Vec<DeviceSnapshot> {
        self.devices
            .read()
            .values()
            .map(|device| device.lock().snapshot())
            .collect()
    }

    pub fn get_current(&self, name: &str, axis: Axis) -> Result<u8> {
        Ok(self.device(name)?.lock().get_current(axis))
    }

    pub fn get_target(&self, name: &str, axis: Axis) -> Result<u8> {
        Ok(self.device(name)?.lock().get_target(axis))
    }

    /// Command a normalized target, rejecting values above 99
    pub fn set_target(&self, name: &str, axis: Axis, value: i64) -> Result<()> {
        let level = u8::try_from(value)
            .ok()
            .filter(|level| i32::from(*level) <= LEVEL_MAX)
            .ok_or(ShutterError::InvalidLevel(value))?;
        self.device(name)?.lock().set_target(axis, level);
        Ok(())
    }
}

/// Resolve an axis name for `device`
pub fn parse_axis(device: &str, axis: &str) -> Result<Axis> {
    axis.parse::<Axis>()
        .map_err(|axis| ShutterError::MissingAttributeMapping {
            device: device.to_string(),
            axis,
        })
}
