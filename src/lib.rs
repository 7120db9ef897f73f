//! bluewatch - Unit and node event monitor for a BlueChi controller
//!
//! This crate implements the client side of the controller's monitoring
//! protocol: creating a monitor, registering signal filters, subscribing to
//! node and unit patterns, and classifying the inbound signal stream into
//! typed lifecycle events.
//!
//! # Modules
//!
//! - [`bus`] - Message bus transports and the untyped signal model
//! - [`cli`] - Command-line interface definitions
//! - [`config`] - Configuration file parsing and validation
//! - [`error`] - Error types and error handling
//! - [`monitor`] - Sessions, subscriptions and event dispatch
//! - [`output`] - Rendering of events for the command line

pub mod bus;
pub mod cli;
pub mod config;
pub mod error;
pub mod monitor;
pub mod output;

// Re-exports for convenience
pub use bus::{BusTransport, DbusTransport, MemoryTransport};
pub use cli::Cli;
pub use config::Config;
pub use error::{BluewatchError, ErrorCode, Result};
pub use monitor::{
    EventDispatcher, LifecycleEvent, MonitorSession, NodeStatusWatcher, Pattern, SubscriptionId,
    SystemStatusWatcher,
};
