//! Simulated transport - in-process shutter nodes for development and tests
//!
//! Each configured node behaves like a Qubino shutter channel: a level write
//! turns the motor on (meter watts > 0), moves the level in fixed steps, then
//! turns the motor off. Like the real device, the level is only reported when
//! it is refreshed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use super::{
    NodeId, NodeReport, Transport, ValueId, ValueReport, ZWaveEvent,
    COMMAND_CLASS_SWITCH_MULTILEVEL, LEVEL_INDEX,
};
use crate::config::SimulatedConfig;

const EVENT_BUFFER: usize = 256;

pub struct SimulatedTransport {
    config: SimulatedConfig,
    levels: Arc<Mutex<HashMap<NodeId, i32>>>,
    event_tx: Mutex<Option<mpsc::Sender<ZWaveEvent>>>,
    motions: Mutex<HashMap<NodeId, JoinHandle<()>>>,
}

impl SimulatedTransport {
    pub fn new(config: SimulatedConfig) -> Self {
        let levels = config
            .nodes
            .iter()
            .map(|node| (node.node_id, node.level))
            .collect();
        Self {
            config,
            levels: Arc::new(Mutex::new(levels)),
            event_tx: Mutex::new(None),
            motions: Mutex::new(HashMap::new()),
        }
    }

    /// Current simulated level of a node
    pub fn level(&self, node_id: NodeId) -> Option<i32> {
        self.levels.lock().get(&node_id).copied()
    }

    fn sender(&self) -> Result<mpsc::Sender<ZWaveEvent>> {
        self.event_tx
            .lock()
            .clone()
            .ok_or_else(|| anyhow!("simulated transport is not connected"))
    }

    fn check_level_value(&self, value_id: &ValueId) -> Result<()> {
        if value_id.class_id != COMMAND_CLASS_SWITCH_MULTILEVEL || value_id.index != LEVEL_INDEX {
            bail!("simulated node only exposes its level, got {:?}", value_id);
        }
        if !self.levels.lock().contains_key(&value_id.node_id) {
            bail!("unknown node {}", value_id.node_id);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for SimulatedTransport {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn connect(&self, path: &str) -> Result<mpsc::Receiver<ZWaveEvent>> {
        info!(
            "Simulated controller on {} with {} node(s)",
            path,
            self.config.nodes.len()
        );
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        *self.event_tx.lock() = Some(tx.clone());

        let nodes = self.config.nodes.clone();
        tokio::spawn(async move {
            for node in nodes {
                let added = [ValueReport::level(node.level), ValueReport::watts(0.0)];
                for value in added {
                    let event = ZWaveEvent::ValueAdded {
                        node_id: node.node_id,
                        value,
                    };
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                let ready = ZWaveEvent::NodeReady {
                    node_id: node.node_id,
                    info: NodeReport {
                        manufacturer_id: node.manufacturer_id,
                        product_id: node.product_id,
                        name: node.name,
                        location: node.location,
                    },
                };
                if tx.send(ready).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(ZWaveEvent::ScanComplete).await;
        });

        Ok(rx)
    }

    async fn set_value(&self, value_id: ValueId, value: i32) -> Result<()> {
        self.check_level_value(&value_id)?;
        let tx = self.sender()?;
        let node_id = value_id.node_id;
        let levels = self.levels.clone();
        let step = Duration::from_millis(self.config.step_ms);
        let step_size = self.config.step_size.max(1);
        let watts = self.config.watts;

        debug!("Simulated node {} moving to {}", node_id, value);

        let motion = tokio::spawn(async move {
            let on = ZWaveEvent::ValueChanged {
                node_id,
                value: ValueReport::watts(watts),
            };
            if tx.send(on).await.is_err() {
                return;
            }
            loop {
                tokio::time::sleep(step).await;
                let reached = {
                    let mut guard = levels.lock();
                    let Some(level) = guard.get_mut(&node_id) else {
                        return;
                    };
                    *level += (value - *level).clamp(-step_size, step_size);
                    trace!("Simulated node {} at {}", node_id, *level);
                    *level == value
                };
                if reached {
                    break;
                }
            }
            let off = ZWaveEvent::ValueChanged {
                node_id,
                value: ValueReport::watts(0.0),
            };
            let _ = tx.send(off).await;
        });

        if let Some(previous) = self.motions.lock().insert(node_id, motion) {
            previous.abort();
        }
        Ok(())
    }

    async fn refresh_value(&self, value_id: ValueId) -> Result<()> {
        self.check_level_value(&value_id)?;
        let level = self
            .level(value_id.node_id)
            .ok_or_else(|| anyhow!("unknown node {}", value_id.node_id))?;
        // The caller may be the only reader of this queue, so never wait on it
        self.sender()?
            .try_send(ZWaveEvent::ValueChanged {
                node_id: value_id.node_id,
                value: ValueReport::level(level),
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => {
                    anyhow!("event queue full, dropping refresh of node {}", value_id.node_id)
                }
                TrySendError::Closed(_) => anyhow!("event receiver dropped"),
            })
    }

    async fn shutdown(&self) -> Result<()> {
        for (_, motion) in self.motions.lock().drain() {
            motion.abort();
        }
        self.event_tx.lock().take();
        info!("Simulated controller closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatedNode;
    use crate::zwave::{dispatch, TransportCommand};

    fn make_config() -> SimulatedConfig {
        SimulatedConfig {
            step_ms: 1,
            step_size: 10,
            watts: 35.0,
            nodes: vec![
                SimulatedNode::new(2, "position", "Kitchen", 20),
                SimulatedNode::new(3, "angle", "Kitchen", 0),
            ],
        }
    }

    async fn next(rx: &mut mpsc::Receiver<ZWaveEvent>) -> ZWaveEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_connect_announces_nodes() {
        let transport = SimulatedTransport::new(make_config());
        let mut rx = transport.connect("/dev/null").await.unwrap();

        assert_eq!(
            next(&mut rx).await,
            ZWaveEvent::ValueAdded {
                node_id: 2,
                value: ValueReport::level(20)
            }
        );
        assert_eq!(
            next(&mut rx).await,
            ZWaveEvent::ValueAdded {
                node_id: 2,
                value: ValueReport::watts(0.0)
            }
        );
        match next(&mut rx).await {
            ZWaveEvent::NodeReady { node_id, info } => {
                assert_eq!(node_id, 2);
                assert_eq!(info.name, "position");
                assert_eq!(info.location, "Kitchen");
            }
            other => panic!("unexpected event {:?}", other),
        }

        // Second node, then the end of the scan
        for _ in 0..3 {
            next(&mut rx).await;
        }
        assert_eq!(next(&mut rx).await, ZWaveEvent::ScanComplete);
    }

    #[tokio::test]
    async fn test_motion_cycle() {
        let transport = SimulatedTransport::new(make_config());
        let mut rx = transport.connect("/dev/null").await.unwrap();
        while next(&mut rx).await != ZWaveEvent::ScanComplete {}

        transport.set_value(ValueId::level(2), 50).await.unwrap();

        assert_eq!(
            next(&mut rx).await,
            ZWaveEvent::ValueChanged {
                node_id: 2,
                value: ValueReport::watts(35.0)
            }
        );
        assert_eq!(
            next(&mut rx).await,
            ZWaveEvent::ValueChanged {
                node_id: 2,
                value: ValueReport::watts(0.0)
            }
        );
        assert_eq!(transport.level(2), Some(50));

        transport.refresh_value(ValueId::level(2)).await.unwrap();
        assert_eq!(
            next(&mut rx).await,
            ZWaveEvent::ValueChanged {
                node_id: 2,
                value: ValueReport::level(50)
            }
        );
    }

    #[tokio::test]
    async fn test_refresh_never_waits_on_full_queue() {
        let transport = SimulatedTransport::new(make_config());
        // Nobody reads: the queue fills with the scan and then the refreshes
        let _rx = transport.connect("/dev/null").await.unwrap();

        let mut rejected = 0;
        for _ in 0..EVENT_BUFFER + 16 {
            let result = tokio::time::timeout(
                Duration::from_millis(50),
                dispatch(&transport, TransportCommand::RefreshLevel { node_id: 2 }),
            )
            .await
            .expect("refresh blocked on the event queue");
            if result.is_err() {
                rejected += 1;
            }
        }
        assert!(rejected > 0);
    }

    #[tokio::test]
    async fn test_rejects_unknown_values() {
        let transport = SimulatedTransport::new(make_config());
        assert!(transport.refresh_value(ValueId::level(2)).await.is_err());

        let _rx = transport.connect("/dev/null").await.unwrap();
        assert!(transport.set_value(ValueId::level(9), 10).await.is_err());
        assert!(transport.set_value(ValueId::watts(2), 10).await.is_err());
    }
}
