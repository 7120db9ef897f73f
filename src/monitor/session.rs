//! Monitor session.
//!
//! A session owns exactly one monitor object on the controller. The protocol
//! is create, register filters, subscribe, then stream:
//!
//! 1. [`MonitorSession::create`] asks the controller for a monitor object.
//! 2. [`MonitorSession::register_filters`] asks the bus to deliver the four
//!    monitor signals from that object. Signals emitted before this point
//!    are lost, so subscribing without filters is refused.
//! 3. [`MonitorSession::subscribe`] registers node and unit patterns.
//! 4. [`MonitorSession::run`] classifies the resulting signal stream and
//!    reports which subscriptions each event falls under.
//!
//! The monitor is never recreated within a session. Closing it releases all
//! of its subscriptions on the controller.

use crate::bus::{BusTransport, SignalReceiver};
use crate::config::BusConfig;
use crate::error::{BluewatchError, Result};
use crate::monitor::dispatcher::{receive_loop, DispatchStats, EventDispatcher};
use crate::monitor::event::LifecycleEvent;
use crate::monitor::pattern::Pattern;
use crate::monitor::registry::{InterestRegistry, Subscription, SubscriptionId};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle to the monitor object owned by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorHandle {
    path: String,
}

impl MonitorHandle {
    /// Object path of the monitor.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for MonitorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MonitorState {
    Uncreated,
    Open(MonitorHandle),
    Closed(MonitorHandle),
}

/// A client session owning one controller-side monitor.
pub struct MonitorSession {
    transport: Arc<dyn BusTransport>,
    bus: BusConfig,
    registry: InterestRegistry,
    state: MonitorState,
}

impl MonitorSession {
    /// Creates a session; no remote calls are made yet.
    pub fn new(transport: Arc<dyn BusTransport>, bus: BusConfig) -> Self {
        Self {
            registry: InterestRegistry::new(transport.clone(), bus.clone()),
            transport,
            bus,
            state: MonitorState::Uncreated,
        }
    }

    /// Creates the monitor object.
    ///
    /// Fails if this session already created one, even if it was closed.
    pub async fn create(&mut self) -> Result<MonitorHandle> {
        if let MonitorState::Open(handle) | MonitorState::Closed(handle) = &self.state {
            return Err(BluewatchError::session(format!(
                "monitor {} already created for this session",
                handle
            )));
        }

        let path = self.transport.create_monitor().await?;
        let handle = MonitorHandle { path };
        info!(monitor = %handle, transport = self.transport.name(), "Created monitor");

        self.state = MonitorState::Open(handle.clone());
        Ok(handle)
    }

    /// Registers the four monitor signal filters for the open monitor.
    pub async fn register_filters(&mut self) -> Result<()> {
        let path = self.open_monitor()?.path.clone();
        self.registry.register_monitor_filters(&path).await
    }

    /// Subscribes to units matching both patterns.
    pub async fn subscribe(&mut self, node: &Pattern, unit: &Pattern) -> Result<SubscriptionId> {
        let path = self.open_monitor()?.path.clone();

        if !self.registry.has_monitor_filters(&path) {
            return Err(BluewatchError::session(
                "monitor signal filters must be registered before subscribing",
            ));
        }

        let id = SubscriptionId(
            self.transport
                .subscribe(&path, node.as_str(), unit.as_str())
                .await?,
        );
        info!(
            subscription = %id,
            node = %node,
            unit = %unit,
            monitor = %path,
            "Subscribed"
        );

        self.registry.record(Subscription {
            id,
            node: node.clone(),
            unit: unit.clone(),
        });
        Ok(id)
    }

    /// Creates the monitor, registers its filters and subscribes once.
    pub async fn setup(&mut self, node: &Pattern, unit: &Pattern) -> Result<SubscriptionId> {
        self.create().await?;
        self.register_filters().await?;
        self.subscribe(node, unit).await
    }

    /// Cancels one subscription.
    pub async fn unsubscribe(&mut self, id: SubscriptionId) -> Result<()> {
        let path = self.open_monitor()?.path.clone();

        if self.registry.get(id).is_none() {
            return Err(BluewatchError::session(format!(
                "subscription {} is not active in this session",
                id
            )));
        }

        self.transport.unsubscribe(&path, id.0).await?;
        self.registry.forget(id);
        info!(subscription = %id, monitor = %path, "Unsubscribed");
        Ok(())
    }

    /// Closes the monitor. Later subscribe calls fail.
    pub async fn close(&mut self) -> Result<()> {
        let handle = self.open_monitor()?.clone();

        self.transport.close_monitor(handle.path()).await?;
        self.registry.clear_subscriptions();
        info!(monitor = %handle, "Closed monitor");

        self.state = MonitorState::Closed(handle);
        Ok(())
    }

    /// Closes the monitor once a receive loop has ended.
    ///
    /// If the loop ended because the transport closed the stream, the
    /// connection is gone and a failed close is only logged.
    pub async fn close_after(&mut self, stats: &DispatchStats) -> Result<()> {
        match self.close().await {
            Err(e) if stats.stream_closed => {
                debug!(error = %e, "Monitor not closed, connection already gone");
                Ok(())
            }
            result => result,
        }
    }

    /// The open monitor, if any.
    pub fn monitor(&self) -> Option<&MonitorHandle> {
        match &self.state {
            MonitorState::Open(handle) => Some(handle),
            _ => None,
        }
    }

    /// Active subscriptions.
    pub fn subscriptions(&self) -> &[Subscription] {
        self.registry.subscriptions()
    }

    /// The session's interest registry.
    pub fn registry(&self) -> &InterestRegistry {
        &self.registry
    }

    /// The node every active subscription is restricted to, if there is one.
    pub fn context_node(&self) -> Option<String> {
        let mut nodes = self.subscriptions().iter().map(|s| s.node.literal());
        let first = nodes.next()??;
        nodes
            .all(|node| node == Some(first))
            .then(|| first.to_string())
    }

    /// A dispatcher for this session's signal stream.
    pub fn dispatcher(&self) -> EventDispatcher {
        EventDispatcher::new(self.bus.clone()).with_context_node(self.context_node())
    }

    /// Consumes `signals` until the stream closes or `shutdown` completes.
    ///
    /// Each event is handed over with the ids of the subscriptions covering
    /// it. Events no subscription covers are still delivered, with no ids.
    pub async fn run<F, S>(&self, signals: &mut SignalReceiver, shutdown: S, mut handler: F) -> DispatchStats
    where
        F: FnMut(LifecycleEvent, Vec<SubscriptionId>),
        S: Future<Output = ()>,
    {
        let dispatcher = self.dispatcher();
        receive_loop(
            signals,
            shutdown,
            |signal| dispatcher.classify(signal),
            |event| {
                let ids: Vec<SubscriptionId> = self.registry.matching(&event).map(|s| s.id).collect();
                if ids.is_empty() {
                    debug!(event = event.kind(), "Event outside every subscription");
                }
                handler(event, ids)
            },
        )
        .await
    }

    fn open_monitor(&self) -> Result<&MonitorHandle> {
        match &self.state {
            MonitorState::Open(handle) => Ok(handle),
            MonitorState::Uncreated => Err(BluewatchError::session(
                "monitor must be created before use",
            )),
            MonitorState::Closed(handle) => Err(BluewatchError::session(format!(
                "monitor {} is closed",
                handle
            ))),
        }
    }
}

impl Drop for MonitorSession {
    fn drop(&mut self) {
        if let MonitorState::Open(handle) = &self.state {
            if self.subscriptions().is_empty() {
                debug!(monitor = %handle, "Session dropped, monitor released with the connection");
            } else {
                warn!(
                    monitor = %handle,
                    subscriptions = self.subscriptions().len(),
                    "Session dropped without close, monitor released with the connection"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryTransport;
    use crate::error::ErrorCode;

    fn session() -> (Arc<MemoryTransport>, MonitorSession) {
        let transport = Arc::new(MemoryTransport::new(BusConfig::default()));
        let session = MonitorSession::new(transport.clone(), BusConfig::default());
        (transport, session)
    }

    fn pattern(value: &str) -> Pattern {
        value.parse().unwrap()
    }

    #[tokio::test]
    async fn test_setup_order() {
        let (transport, mut session) = session();
        let id = session
            .setup(&pattern("worker1"), &pattern("*"))
            .await
            .unwrap();

        assert_eq!(id, SubscriptionId(1));
        assert_eq!(
            session.monitor().map(MonitorHandle::path),
            Some("/org/eclipse/bluechi/monitor/1")
        );
        assert_eq!(
            transport.calls(),
            vec![
                "CreateMonitor",
                "AddMatch",
                "AddMatch",
                "AddMatch",
                "AddMatch",
                "Subscribe"
            ]
        );
        assert_eq!(session.subscriptions().len(), 1);
    }

    #[tokio::test]
    async fn test_create_twice_is_refused() {
        let (transport, mut session) = session();
        session.create().await.unwrap();

        let err = session.create().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SessionState);
        assert_eq!(transport.calls(), vec!["CreateMonitor"]);
    }

    #[tokio::test]
    async fn test_subscribe_before_create_is_refused() {
        let (transport, mut session) = session();
        let err = session
            .subscribe(&Pattern::Any, &Pattern::Any)
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::SessionState);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_without_filters_is_refused() {
        let (transport, mut session) = session();
        session.create().await.unwrap();

        let err = session
            .subscribe(&Pattern::Any, &Pattern::Any)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("filters"));
        assert_eq!(transport.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_filter_failure_aborts_setup() {
        let (transport, mut session) = session();
        transport.fail_on("AddMatch");

        let err = session
            .setup(&Pattern::Any, &Pattern::Any)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TransportError);
        assert!(!transport.calls().contains(&"Subscribe".to_string()));
    }

    #[tokio::test]
    async fn test_create_failure_is_remote_call_error() {
        let (transport, mut session) = session();
        transport.fail_on("CreateMonitor");

        let err = session.create().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::RemoteCallError);
        assert!(session.monitor().is_none());
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let (transport, mut session) = session();
        let id = session.setup(&Pattern::Any, &Pattern::Any).await.unwrap();
        let second = session
            .subscribe(&Pattern::Any, &pattern("nginx.service"))
            .await
            .unwrap();
        assert_eq!(transport.active_subscriptions(), 2);

        session.unsubscribe(id).await.unwrap();
        assert_eq!(transport.active_subscriptions(), 1);
        assert_eq!(session.subscriptions()[0].id, second);

        let err = session.unsubscribe(id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::SessionState);
    }

    #[tokio::test]
    async fn test_close_makes_handle_stale() {
        let (transport, mut session) = session();
        session.setup(&Pattern::Any, &Pattern::Any).await.unwrap();
        let path = session.monitor().unwrap().path().to_string();

        session.close().await.unwrap();
        assert!(!transport.is_monitor_open(&path));
        assert_eq!(transport.active_subscriptions(), 0);
        assert!(session.subscriptions().is_empty());
        assert!(session.monitor().is_none());

        let err = session
            .subscribe(&Pattern::Any, &Pattern::Any)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("closed"));
        assert!(session.create().await.is_err());
        assert!(session.close().await.is_err());
    }

    #[tokio::test]
    async fn test_context_node() {
        let (_, mut session) = session();
        assert_eq!(session.context_node(), None);

        session
            .setup(&pattern("worker1"), &Pattern::Any)
            .await
            .unwrap();
        assert_eq!(session.context_node(), Some("worker1".to_string()));
        assert_eq!(session.dispatcher().context_node(), Some("worker1"));

        session
            .subscribe(&pattern("worker1"), &pattern("nginx.service"))
            .await
            .unwrap();
        assert_eq!(session.context_node(), Some("worker1".to_string()));

        session
            .subscribe(&pattern("worker2"), &Pattern::Any)
            .await
            .unwrap();
        assert_eq!(session.context_node(), None);
    }

    #[tokio::test]
    async fn test_wildcard_node_has_no_context() {
        let (_, mut session) = session();
        session.setup(&Pattern::Any, &Pattern::Any).await.unwrap();
        assert_eq!(session.context_node(), None);
    }

    #[tokio::test]
    async fn test_close_after_closed_stream_tolerates_failure() {
        let (transport, mut session) = session();
        session.setup(&pattern("worker1"), &Pattern::Any).await.unwrap();
        transport.fail_on("Close");

        let stats = DispatchStats {
            stream_closed: true,
            ..DispatchStats::default()
        };
        session.close_after(&stats).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_after_shutdown_reports_failure() {
        let (transport, mut session) = session();
        session.setup(&pattern("worker1"), &Pattern::Any).await.unwrap();
        transport.fail_on("Close");

        let err = session
            .close_after(&DispatchStats::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RemoteCallError);
    }
}
