//! System status watcher.
//!
//! The controller publishes the overall status of the system as the `Status`
//! property of its own object. Like node status, watching it needs no
//! monitor: a property-change filter on the controller object is enough.

use crate::bus::{BusTransport, SignalReceiver};
use crate::config::BusConfig;
use crate::error::Result;
use crate::monitor::dispatcher::{receive_loop, DispatchStats, EventDispatcher};
use crate::monitor::event::LifecycleEvent;
use crate::monitor::registry::{InterestRegistry, SignalCategory};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Watches the controller's system status.
pub struct SystemStatusWatcher {
    registry: InterestRegistry,
    dispatcher: EventDispatcher,
}

impl SystemStatusWatcher {
    /// Creates a watcher; no remote calls are made yet.
    pub fn new(transport: Arc<dyn BusTransport>, bus: BusConfig) -> Self {
        Self {
            registry: InterestRegistry::new(transport, bus.clone()),
            dispatcher: EventDispatcher::new(bus),
        }
    }

    /// Registers the controller property filter.
    pub async fn start(&mut self) -> Result<()> {
        self.registry
            .register_filter(SignalCategory::ControllerProperties)
            .await?;
        info!("Watching system status");
        Ok(())
    }

    /// Whether the controller property filter is registered.
    pub fn is_started(&self) -> bool {
        self.registry
            .is_registered(&SignalCategory::ControllerProperties)
    }

    /// Consumes `signals` until the stream closes or `shutdown` completes,
    /// handing every system status change to `handler`.
    pub async fn run<F, S>(&self, signals: &mut SignalReceiver, shutdown: S, handler: F) -> DispatchStats
    where
        F: FnMut(LifecycleEvent),
        S: Future<Output = ()>,
    {
        receive_loop(
            signals,
            shutdown,
            |signal| self.dispatcher.classify_system_status(signal),
            handler,
        )
        .await
    }
}
