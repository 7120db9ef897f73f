//! Bus module - message bus transports.
//!
//! This module defines the `BusTransport` trait through which the monitor
//! session talks to the controller, along with a D-Bus implementation and an
//! in-memory implementation.

pub mod dbus;
pub mod memory;
pub mod signal;

use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

// Re-exports for convenience
pub use dbus::DbusTransport;
pub use memory::MemoryTransport;
pub use signal::{NodeInfo, RawSignal, SignalFilter, SignalValue};

/// Receiving end of the inbound signal stream.
///
/// Unbounded and FIFO; `recv` returns `None` once the transport has closed it.
pub type SignalReceiver = mpsc::UnboundedReceiver<RawSignal>;

/// Trait for message bus transports.
///
/// A transport owns the bus connection. It registers signal filters, performs
/// remote method calls on the controller and its objects, and hands out the
/// stream of inbound signals.
#[async_trait]
pub trait BusTransport: Send + Sync {
    /// Returns the name of this transport.
    fn name(&self) -> &'static str;

    /// Asks the bus to start delivering signals matching `filter`.
    async fn add_signal_filter(&self, filter: &SignalFilter) -> Result<()>;

    /// Takes the inbound signal stream. Can only be taken once.
    async fn signals(&self) -> Result<SignalReceiver>;

    /// Creates a monitor object on the controller and returns its path.
    async fn create_monitor(&self) -> Result<String>;

    /// Subscribes a monitor to units matching the node and unit patterns.
    async fn subscribe(&self, monitor: &str, node: &str, unit: &str) -> Result<u32>;

    /// Cancels a subscription of a monitor.
    async fn unsubscribe(&self, monitor: &str, id: u32) -> Result<()>;

    /// Closes a monitor, releasing its subscriptions on the controller.
    async fn close_monitor(&self, monitor: &str) -> Result<()>;

    /// Lists all nodes known to the controller.
    async fn list_nodes(&self) -> Result<Vec<NodeInfo>>;

    /// Resolves a node name to its object path.
    async fn get_node(&self, name: &str) -> Result<String>;
}
