//! Per-node level polling while a motor runs
//!
//! Qubino shutters only push their level when they stop, so while the meter
//! reports power draw the level is polled on a fixed interval. Each poll is a
//! tokio task keyed by node and is aborted on the stop transition.

use std::collections::HashMap;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::zwave::{NodeId, TransportHandle};

pub struct RefreshScheduler {
    interval: Duration,
    transport: TransportHandle,
    tasks: HashMap<NodeId, JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn new(interval: Duration, transport: TransportHandle) -> Self {
        Self {
            interval,
            transport,
            tasks: HashMap::new(),
        }
    }

    pub fn is_running(&self, node_id: NodeId) -> bool {
        self.tasks.contains_key(&node_id)
    }

    /// Start polling `node_id`; the first refresh is issued immediately.
    ///
    /// Returns false if a poll was already running.
    pub fn start(&mut self, node_id: NodeId) -> bool {
        if self.is_running(node_id) {
            return false;
        }
        debug!("Polling node {} every {:?}", node_id, self.interval);

        let transport = self.transport.clone();
        let interval = self.interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                transport.refresh_level(node_id);
            }
        });
        self.tasks.insert(node_id, task);
        true
    }

    /// Stop polling `node_id`. Returns false if no poll was running.
    pub fn stop(&mut self, node_id: NodeId) -> bool {
        match self.tasks.remove(&node_id) {
            Some(task) => {
                task.abort();
                debug!("Stopped polling node {}", node_id);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop_all();
    }
}
