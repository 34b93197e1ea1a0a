//! Configuration management for the shutter gateway
//!
//! Handles loading, parsing and validation of the YAML configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::fs;

use crate::shutter::AxisRanges;
use crate::zwave::NodeId;

/// Qubino manufacturer id
pub const QUBINO_MANUFACTURER_ID: &str = "0x0159";
/// Qubino Flush Shutter product id
pub const SHUTTER_PRODUCT_ID: &str = "0x0052";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub zwave: ZWaveConfig,
    #[serde(default)]
    pub shutter: AxisRanges,
    #[serde(default)]
    pub simulator: SimulatedConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Z-Wave controller configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ZWaveConfig {
    /// Controller device path (e.g. /dev/ttyACM0)
    pub path: String,
    #[serde(default = "default_manufacturer_id")]
    pub manufacturer_id: String,
    #[serde(default = "default_product_id")]
    pub product_id: String,
    /// Level poll interval while a motor runs
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

/// Simulated controller configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulatedConfig {
    /// Delay between two level steps
    #[serde(default = "default_step_ms")]
    pub step_ms: u64,
    /// Level change per step
    #[serde(default = "default_step_size")]
    pub step_size: i32,
    /// Power reported while moving
    #[serde(default = "default_watts")]
    pub watts: f64,
    #[serde(default)]
    pub nodes: Vec<SimulatedNode>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            step_ms: default_step_ms(),
            step_size: default_step_size(),
            watts: default_watts(),
            nodes: Vec::new(),
        }
    }
}

/// A simulated shutter channel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulatedNode {
    pub node_id: NodeId,
    /// Axis driven by this node (`position` or `angle`)
    pub name: String,
    /// Shutter group label
    pub location: String,
    #[serde(default)]
    pub level: i32,
    #[serde(default = "default_manufacturer_id")]
    pub manufacturer_id: String,
    #[serde(default = "default_product_id")]
    pub product_id: String,
}

impl SimulatedNode {
    pub fn new(node_id: NodeId, name: &str, location: &str, level: i32) -> Self {
        Self {
            node_id,
            name: name.to_string(),
            location: location.to_string(),
            level,
            manufacturer_id: default_manufacturer_id(),
            product_id: default_product_id(),
        }
    }
}

/// Accessory API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_api_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        Ok(config)
    }

    /// Parse and validate configuration from YAML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.zwave.path.is_empty() {
            anyhow::bail!("zwave.path cannot be empty");
        }
        if self.zwave.refresh_interval_ms == 0 {
            anyhow::bail!("zwave.refresh_interval_ms must be greater than 0");
        }

        for (axis, range) in [("position", self.shutter.position), ("angle", self.shutter.angle)] {
            if !range.is_valid() {
                anyhow::bail!(
                    "shutter.{} range is invalid: min {} must be below max {}",
                    axis,
                    range.min,
                    range.max
                );
            }
        }

        let mut node_ids = HashSet::new();
        for node in &self.simulator.nodes {
            if node.node_id == 0 {
                anyhow::bail!("Simulated node id 0 is reserved");
            }
            if !node_ids.insert(node.node_id) {
                anyhow::bail!("Simulated node {} is defined twice", node.node_id);
            }
            if node.location.is_empty() {
                anyhow::bail!("Simulated node {} location cannot be empty", node.node_id);
            }
        }

        Ok(())
    }
}

// Default value functions
fn default_manufacturer_id() -> String { QUBINO_MANUFACTURER_ID.to_string() }
fn default_product_id() -> String { SHUTTER_PRODUCT_ID.to_string() }
fn default_refresh_interval_ms() -> u64 { 5000 }
fn default_step_ms() -> u64 { 200 }
fn default_step_size() -> i32 { 5 }
fn default_watts() -> f64 { 40.0 }
fn default_true() -> bool { true }
fn default_api_port() -> u16 { 8126 }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::ValueRange;

    const MINIMAL: &str = r#"
zwave:
  path: "/dev/ttyACM0"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::parse(MINIMAL).unwrap();

        assert_eq!(config.zwave.manufacturer_id, "0x0159");
        assert_eq!(config.zwave.product_id, "0x0052");
        assert_eq!(config.zwave.refresh_interval_ms, 5000);
        assert_eq!(config.shutter.position, ValueRange::new(0, 100));
        assert_eq!(config.shutter.angle, ValueRange::new(-90, 90));
        assert!(config.api.enabled);
        assert!(config.simulator.nodes.is_empty());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
zwave:
  path: "/dev/ttyUSB0"
  refresh_interval_ms: 1000
shutter:
  angle: { min: 0, max: 99 }
simulator:
  step_ms: 50
  nodes:
    - { node_id: 2, name: position, location: Living, level: 40 }
    - { node_id: 3, name: angle, location: Living }
api:
  enabled: false
  port: 9000
"#;
        let config = AppConfig::parse(yaml).unwrap();

        assert_eq!(config.zwave.refresh_interval_ms, 1000);
        assert_eq!(config.shutter.angle, ValueRange::new(0, 99));
        assert_eq!(config.shutter.position, ValueRange::new(0, 100));
        assert_eq!(config.simulator.step_ms, 50);
        assert_eq!(config.simulator.nodes.len(), 2);
        assert_eq!(config.simulator.nodes[0].level, 40);
        assert_eq!(config.simulator.nodes[1].product_id, "0x0052");
        assert!(!config.api.enabled);
        assert_eq!(config.api.port, 9000);
    }

    #[test]
    fn test_rejects_inverted_range() {
        let yaml = r#"
zwave:
  path: "/dev/ttyACM0"
shutter:
  position: { min: 100, max: 0 }
"#;
        let err = AppConfig::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("shutter.position"));
    }

    #[test]
    fn test_rejects_duplicate_nodes() {
        let yaml = r#"
zwave:
  path: "/dev/ttyACM0"
simulator:
  nodes:
    - { node_id: 2, name: position, location: A }
    - { node_id: 2, name: angle, location: A }
"#;
        assert!(AppConfig::parse(yaml).is_err());
    }

    #[tokio::test]
    async fn test_load_from_file() -> Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, MINIMAL)?;

        let config = AppConfig::load(&path.to_string_lossy()).await?;
        assert_eq!(config.zwave.path, "/dev/ttyACM0");

        assert!(AppConfig::load("/nonexistent/config.yaml").await.is_err());
        Ok(())
    }
}
