//! Monitor module - subscriptions and event dispatch.
//!
//! This module implements the client side of the monitoring protocol: the
//! session that owns a controller-side monitor, the registry of signal
//! filters and subscriptions, and the dispatcher that turns raw signals into
//! typed lifecycle events.

pub mod dispatcher;
pub mod event;
pub mod node_status;
pub mod pattern;
pub mod registry;
pub mod session;
pub mod system_status;


// Re-exports for convenience
pub use dispatcher::{DispatchStats, EventDispatcher};
pub use event::{LifecycleEvent, MonitorSignal};
pub use node_status::NodeStatusWatcher;
pub use pattern::Pattern;
pub use registry::{InterestRegistry, SignalCategory, Subscription, SubscriptionId};
pub use session::{MonitorHandle, MonitorSession};
pub use system_status::SystemStatusWatcher;
