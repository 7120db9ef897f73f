//! In-memory transport.
//!
//! Plays the controller side of the protocol inside the process: it assigns
//! monitor paths and subscription ids, remembers which monitors are open,
//! records every filter and call, and lets callers inject signals. Used to
//! exercise sessions and dispatchers without a bus.

use crate::bus::signal::{NodeInfo, RawSignal, SignalFilter};
use crate::bus::{BusTransport, SignalReceiver};
use crate::config::BusConfig;
use crate::error::{BluewatchError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Default)]
struct ControllerState {
    filters: Vec<SignalFilter>,
    calls: Vec<String>,
    failing: HashSet<String>,
    next_monitor: u32,
    next_subscription: u32,
    open_monitors: HashSet<String>,
    subscriptions: BTreeMap<u32, (String, String, String)>,
    nodes: Vec<NodeInfo>,
}

/// In-memory transport for tests and dry runs.
pub struct MemoryTransport {
    bus: BusConfig,
    state: Mutex<ControllerState>,
    signal_tx: mpsc::UnboundedSender<RawSignal>,
    signal_rx: Mutex<Option<SignalReceiver>>,
}

impl MemoryTransport {
    /// Creates a transport with no nodes.
    pub fn new(bus: BusConfig) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            bus,
            state: Mutex::new(ControllerState::default()),
            signal_tx,
            signal_rx: Mutex::new(Some(signal_rx)),
        }
    }

    /// Adds a node to the controller's node list.
    pub fn with_node(self, name: &str, status: &str) -> Self {
        let node = NodeInfo {
            name: name.to_string(),
            object_path: format!("{}{}", self.bus.node_path_prefix, name),
            status: status.to_string(),
        };
        self.lock().nodes.push(node);
        self
    }

    /// Makes every later call of `method` (e.g. `"Subscribe"`, `"AddMatch"`) fail.
    pub fn fail_on(&self, method: &str) {
        self.lock().failing.insert(method.to_string());
    }

    /// Injects one inbound signal.
    pub fn emit(&self, signal: RawSignal) {
        // The receiver may already be gone; injected signals are then dropped like on a real bus.
        let _ = self.signal_tx.send(signal);
    }

    /// Filters registered so far, in registration order.
    pub fn filters(&self) -> Vec<SignalFilter> {
        self.lock().filters.clone()
    }

    /// Remote methods called so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of subscriptions the controller currently holds.
    pub fn active_subscriptions(&self) -> usize {
        self.lock().subscriptions.len()
    }

    /// Whether the monitor at `path` is open.
    pub fn is_monitor_open(&self, path: &str) -> bool {
        self.lock().open_monitors.contains(path)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records a call and fails it if requested.
    fn begin(&self, method: &str) -> Result<std::sync::MutexGuard<'_, ControllerState>> {
        let mut state = self.lock();
        state.calls.push(method.to_string());
        debug!(method = method, "memory transport call");
        if state.failing.contains(method) {
            return Err(BluewatchError::remote_call(method, "injected failure"));
        }
        Ok(state)
    }

    fn require_open(state: &ControllerState, method: &str, monitor: &str) -> Result<()> {
        if state.open_monitors.contains(monitor) {
            Ok(())
        } else {
            Err(BluewatchError::remote_call(
                method,
                format!("unknown object '{}'", monitor),
            ))
        }
    }
}

#[async_trait]
impl BusTransport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn add_signal_filter(&self, filter: &SignalFilter) -> Result<()> {
        let mut state = self.begin("AddMatch").map_err(|e| {
            BluewatchError::transport(format!("Failed to add filter {}: {}", filter, e))
        })?;
        state.filters.push(filter.clone());
        Ok(())
    }

    async fn signals(&self) -> Result<SignalReceiver> {
        self.signal_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| BluewatchError::transport("Signal stream already taken"))
    }

    async fn create_monitor(&self) -> Result<String> {
        let mut state = self.begin("CreateMonitor")?;
        state.next_monitor += 1;
        let path = format!("{}/monitor/{}", self.bus.object_path, state.next_monitor);
        state.open_monitors.insert(path.clone());
        Ok(path)
    }

    async fn subscribe(&self, monitor: &str, node: &str, unit: &str) -> Result<u32> {
        let mut state = self.begin("Subscribe")?;
        Self::require_open(&state, "Subscribe", monitor)?;
        if node.is_empty() || unit.is_empty() {
            return Err(BluewatchError::remote_call(
                "Subscribe",
                "node and unit must not be empty",
            ));
        }
        state.next_subscription += 1;
        let id = state.next_subscription;
        state.subscriptions.insert(
            id,
            (monitor.to_string(), node.to_string(), unit.to_string()),
        );
        Ok(id)
    }

    async fn unsubscribe(&self, monitor: &str, id: u32) -> Result<()> {
        let mut state = self.begin("Unsubscribe")?;
        Self::require_open(&state, "Unsubscribe", monitor)?;
        match state.subscriptions.get(&id) {
            Some((owner, _, _)) if owner == monitor => {
                state.subscriptions.remove(&id);
                Ok(())
            }
            _ => Err(BluewatchError::remote_call(
                "Unsubscribe",
                format!("no such subscription {}", id),
            )),
        }
    }

    async fn close_monitor(&self, monitor: &str) -> Result<()> {
        let mut state = self.begin("Close")?;
        if !state.open_monitors.remove(monitor) {
            return Err(BluewatchError::remote_call("Close", "Monitor already closed"));
        }
        state.subscriptions.retain(|_, (owner, _, _)| owner != monitor);
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        let state = self.begin("ListNodes")?;
        Ok(state.nodes.clone())
    }

    async fn get_node(&self, name: &str) -> Result<String> {
        let state = self.begin("GetNode")?;
        state
            .nodes
            .iter()
            .find(|node| node.name == name)
            .map(|node| node.object_path.clone())
            .ok_or_else(|| BluewatchError::remote_call("GetNode", format!("node '{}' not found", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SignalValue;

    fn transport() -> MemoryTransport {
        MemoryTransport::new(BusConfig::default())
            .with_node("worker1", "online")
            .with_node("worker2", "offline")
    }

    #[tokio::test]
    async fn test_create_monitor_paths_are_unique() {
        let transport = transport();
        let first = transport.create_monitor().await.unwrap();
        let second = transport.create_monitor().await.unwrap();

        assert_eq!(first, "/org/eclipse/bluechi/monitor/1");
        assert_ne!(first, second);
        assert!(transport.is_monitor_open(&first));
    }

    #[tokio::test]
    async fn test_subscribe_requires_open_monitor() {
        let transport = transport();
        let err = transport
            .subscribe("/org/eclipse/bluechi/monitor/9", "*", "*")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown object"));

        let monitor = transport.create_monitor().await.unwrap();
        let id = transport.subscribe(&monitor, "worker1", "*").await.unwrap();
        assert_eq!(transport.active_subscriptions(), 1);

        transport.unsubscribe(&monitor, id).await.unwrap();
        assert_eq!(transport.active_subscriptions(), 0);
        assert!(transport.unsubscribe(&monitor, id).await.is_err());
    }

    #[tokio::test]
    async fn test_close_releases_subscriptions() {
        let transport = transport();
        let monitor = transport.create_monitor().await.unwrap();
        transport.subscribe(&monitor, "*", "a.service").await.unwrap();
        transport.subscribe(&monitor, "*", "b.service").await.unwrap();

        transport.close_monitor(&monitor).await.unwrap();
        assert_eq!(transport.active_subscriptions(), 0);
        assert!(transport.close_monitor(&monitor).await.is_err());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let transport = transport();
        transport.fail_on("AddMatch");

        let err = transport
            .add_signal_filter(&SignalFilter::new("org.eclipse.bluechi.Monitor", "UnitNew"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::TransportError);
        assert!(transport.filters().is_empty());
    }

    #[tokio::test]
    async fn test_nodes() {
        let transport = transport();
        let nodes = transport.list_nodes().await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(
            transport.get_node("worker2").await.unwrap(),
            "/org/eclipse/bluechi/node/worker2"
        );
        assert!(transport.get_node("worker3").await.is_err());
        assert_eq!(transport.calls(), vec!["ListNodes", "GetNode", "GetNode"]);
    }

    #[tokio::test]
    async fn test_signal_stream_taken_once() {
        let transport = transport();
        let mut rx = transport.signals().await.unwrap();
        assert!(transport.signals().await.is_err());

        transport.emit(RawSignal::new(
            "org.eclipse.bluechi.Monitor",
            "UnitNew",
            "/org/eclipse/bluechi/monitor/1",
            vec![SignalValue::from("worker1")],
        ));
        let signal = rx.recv().await.unwrap();
        assert_eq!(signal.member, "UnitNew");
    }
}
