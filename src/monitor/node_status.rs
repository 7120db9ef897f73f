//! Node status watcher.
//!
//! Node status is published as a property of each node object rather than
//! through a monitor, so watching it needs no monitor and no subscription:
//! one property-change filter over the node subtree is enough.

use crate::bus::{BusTransport, NodeInfo, SignalReceiver};
use crate::config::BusConfig;
use crate::error::Result;
use crate::monitor::dispatcher::{receive_loop, DispatchStats, EventDispatcher};
use crate::monitor::event::LifecycleEvent;
use crate::monitor::registry::{InterestRegistry, SignalCategory};
use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

/// Watches connection status changes of every node.
pub struct NodeStatusWatcher {
    transport: Arc<dyn BusTransport>,
    registry: InterestRegistry,
    dispatcher: EventDispatcher,
}

impl NodeStatusWatcher {
    /// Creates a watcher; no remote calls are made yet.
    pub fn new(transport: Arc<dyn BusTransport>, bus: BusConfig) -> Self {
        Self {
            registry: InterestRegistry::new(transport.clone(), bus.clone()),
            dispatcher: EventDispatcher::new(bus),
            transport,
        }
    }

    /// Registers the node property filter and returns the current node list.
    ///
    /// A failed filter registration is fatal. The node list is informational
    /// only; if it cannot be fetched the watcher starts with an empty one.
    pub async fn start(&mut self) -> Result<Vec<NodeInfo>> {
        self.registry
            .register_filter(SignalCategory::NodeProperties)
            .await?;

        match self.transport.list_nodes().await {
            Ok(nodes) => {
                info!(nodes = nodes.len(), "Watching node status");
                Ok(nodes)
            }
            Err(e) => {
                warn!(error = %e, "Failed to list nodes, watching without a snapshot");
                Ok(Vec::new())
            }
        }
    }

    /// Whether the node property filter is registered.
    pub fn is_started(&self) -> bool {
        self.registry.is_registered(&SignalCategory::NodeProperties)
    }

    /// Consumes `signals` until the stream closes or `shutdown` completes,
    /// handing every node status change to `handler`.
    ///
    /// Unit signals on the same stream are ignored.
    pub async fn run<F, S>(&self, signals: &mut SignalReceiver, shutdown: S, handler: F) -> DispatchStats
    where
        F: FnMut(LifecycleEvent),
        S: Future<Output = ()>,
    {
        receive_loop(
            signals,
            shutdown,
            |signal| self.dispatcher.classify_node_status(signal),
            handler,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MemoryTransport, RawSignal, SignalValue};
    use crate::config::{PROPERTIES_CHANGED_MEMBER, PROPERTIES_INTERFACE};
    use crate::error::ErrorCode;
    use std::collections::BTreeMap;

    fn status_changed(node: &str, status: &str) -> RawSignal {
        let mut changed = BTreeMap::new();
        changed.insert(
            "Status".to_string(),
            SignalValue::Variant(Box::new(SignalValue::from(status))),
        );
        RawSignal::new(
            PROPERTIES_INTERFACE,
            PROPERTIES_CHANGED_MEMBER,
            format!("/org/eclipse/bluechi/node/{}", node),
            vec![
                SignalValue::from("org.eclipse.bluechi.Node"),
                SignalValue::Map(changed),
                SignalValue::Array(Vec::new()),
            ],
        )
    }

    #[tokio::test]
    async fn test_start_registers_filter_and_lists_nodes() {
        let transport = Arc::new(
            MemoryTransport::new(BusConfig::default())
                .with_node("worker1", "online")
                .with_node("worker2", "offline"),
        );
        let mut watcher = NodeStatusWatcher::new(transport.clone(), BusConfig::default());

        let nodes = watcher.start().await.unwrap();
        assert!(watcher.is_started());
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].status, "offline");
        assert_eq!(transport.calls(), vec!["AddMatch", "ListNodes"]);

        let filters = transport.filters();
        assert_eq!(filters[0].member, PROPERTIES_CHANGED_MEMBER);
        assert!(filters[0].path.is_none());
    }

    #[tokio::test]
    async fn test_start_survives_list_failure() {
        let transport = Arc::new(MemoryTransport::new(BusConfig::default()));
        transport.fail_on("ListNodes");
        let mut watcher = NodeStatusWatcher::new(transport.clone(), BusConfig::default());

        let nodes = watcher.start().await.unwrap();
        assert!(nodes.is_empty());
        assert!(watcher.is_started());
    }

    #[tokio::test]
    async fn test_start_fails_without_filter() {
        let transport = Arc::new(MemoryTransport::new(BusConfig::default()));
        transport.fail_on("AddMatch");
        let mut watcher = NodeStatusWatcher::new(transport.clone(), BusConfig::default());

        let err = watcher.start().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::TransportError);
        assert!(!watcher.is_started());
        assert!(!transport.calls().contains(&"ListNodes".to_string()));
    }

    #[tokio::test]
    async fn test_run_emits_status_changes_only() {
        let transport = Arc::new(MemoryTransport::new(BusConfig::default()));
        let mut watcher = NodeStatusWatcher::new(transport, BusConfig::default());
        watcher.start().await.unwrap();

        let (tx, mut signals) = tokio::sync::mpsc::unbounded_channel();
        tx.send(status_changed("worker1", "offline")).unwrap();
        tx.send(RawSignal::new(
            "org.eclipse.bluechi.Monitor",
            "UnitNew",
            "/org/eclipse/bluechi/monitor/1",
            vec!["worker1".into(), "nginx.service".into(), "real".into()],
        ))
        .unwrap();
        tx.send(status_changed("worker2", "online")).unwrap();
        drop(tx);

        let mut events = Vec::new();
        let stats = watcher
            .run(&mut signals, std::future::pending(), |event| events.push(event))
            .await;

        assert_eq!(
            events,
            vec![
                LifecycleEvent::NodeStatusChanged {
                    node_name: "worker1".to_string(),
                    new_status: "offline".to_string(),
                },
                LifecycleEvent::NodeStatusChanged {
                    node_name: "worker2".to_string(),
                    new_status: "online".to_string(),
                },
            ]
        );
        assert_eq!(stats.received, 3);
        assert_eq!(stats.ignored, 1);
    }
}
