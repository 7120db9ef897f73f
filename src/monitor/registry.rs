//! Interest registry.
//!
//! Tracks which signal categories the bus has been asked to deliver and which
//! subscriptions the controller has accepted.

use crate::bus::{BusTransport, SignalFilter};
use crate::config::{BusConfig, PROPERTIES_CHANGED_MEMBER, PROPERTIES_INTERFACE};
use crate::error::Result;
use crate::monitor::event::{LifecycleEvent, MonitorSignal};
use crate::monitor::pattern::Pattern;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Subscription identifier assigned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubscriptionId(pub u32);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A subscription accepted by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    /// Controller-assigned id.
    pub id: SubscriptionId,
    /// Node pattern it was created with.
    pub node: Pattern,
    /// Unit pattern it was created with.
    pub unit: Pattern,
}

impl Subscription {
    /// Checks a node and unit name against both patterns.
    pub fn matches(&self, node_name: &str, unit_name: &str) -> bool {
        self.node.matches(node_name) && self.unit.matches(unit_name)
    }

    /// Checks whether a unit event falls under this subscription.
    pub fn covers(&self, event: &LifecycleEvent) -> bool {
        match (event.node_name(), event.unit_name()) {
            (Some(node_name), Some(unit_name)) => self.matches(node_name, unit_name),
            _ => false,
        }
    }
}

/// A category of signals the bus must be asked to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalCategory {
    /// One monitor signal, scoped to the monitor object at `path`.
    Monitor { signal: MonitorSignal, path: String },
    /// Property changes on any node object.
    NodeProperties,
    /// Property changes on the controller object.
    ControllerProperties,
}

impl SignalCategory {
    /// The bus filter for this category.
    pub fn filter(&self, bus: &BusConfig) -> SignalFilter {
        match self {
            SignalCategory::Monitor { signal, path } => {
                SignalFilter::new(bus.monitor_interface(), signal.member()).with_path(path.clone())
            }
            SignalCategory::NodeProperties => {
                SignalFilter::new(PROPERTIES_INTERFACE, PROPERTIES_CHANGED_MEMBER)
                    .with_path_namespace(bus.node_path_namespace())
            }
            SignalCategory::ControllerProperties => {
                SignalFilter::new(PROPERTIES_INTERFACE, PROPERTIES_CHANGED_MEMBER)
                    .with_path(bus.object_path.clone())
            }
        }
    }
}

/// Registry of signal filters and subscriptions.
pub struct InterestRegistry {
    transport: Arc<dyn BusTransport>,
    bus: BusConfig,
    categories: BTreeSet<SignalCategory>,
    subscriptions: Vec<Subscription>,
}

impl InterestRegistry {
    /// Creates an empty registry.
    pub fn new(transport: Arc<dyn BusTransport>, bus: BusConfig) -> Self {
        Self {
            transport,
            bus,
            categories: BTreeSet::new(),
            subscriptions: Vec::new(),
        }
    }

    /// Asks the bus to deliver signals of `category`.
    ///
    /// Registering an already registered category does nothing. A failure
    /// leaves the category unregistered; callers must abort setup.
    pub async fn register_filter(&mut self, category: SignalCategory) -> Result<()> {
        if self.categories.contains(&category) {
            debug!(category = ?category, "Signal filter already registered");
            return Ok(());
        }

        let filter = category.filter(&self.bus);
        self.transport.add_signal_filter(&filter).await?;
        info!(filter = %filter, rule = %filter.match_rule(), "Registered signal filter");

        self.categories.insert(category);
        Ok(())
    }

    /// Registers all four monitor signal categories for the monitor at `path`.
    pub async fn register_monitor_filters(&mut self, path: &str) -> Result<()> {
        for signal in MonitorSignal::ALL {
            self.register_filter(SignalCategory::Monitor {
                signal,
                path: path.to_string(),
            })
            .await?;
        }
        Ok(())
    }

    /// Whether `category` is registered.
    pub fn is_registered(&self, category: &SignalCategory) -> bool {
        self.categories.contains(category)
    }

    /// Whether every monitor signal is registered for the monitor at `path`.
    pub fn has_monitor_filters(&self, path: &str) -> bool {
        MonitorSignal::ALL.into_iter().all(|signal| {
            self.is_registered(&SignalCategory::Monitor {
                signal,
                path: path.to_string(),
            })
        })
    }

    /// Registered categories.
    pub fn categories(&self) -> impl Iterator<Item = &SignalCategory> {
        self.categories.iter()
    }

    /// Records a subscription accepted by the controller.
    pub fn record(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    /// Forgets a subscription; returns it if it was known.
    pub fn forget(&mut self, id: SubscriptionId) -> Option<Subscription> {
        let index = self.subscriptions.iter().position(|s| s.id == id)?;
        Some(self.subscriptions.remove(index))
    }

    /// Forgets all subscriptions.
    pub fn clear_subscriptions(&mut self) {
        self.subscriptions.clear();
    }

    /// Active subscriptions, in creation order.
    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    /// Looks a subscription up by id.
    pub fn get(&self, id: SubscriptionId) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| s.id == id)
    }

    /// Subscriptions whose patterns cover `event`.
    pub fn matching<'a>(
        &'a self,
        event: &'a LifecycleEvent,
    ) -> impl Iterator<Item = &'a Subscription> + 'a {
        self.subscriptions.iter().filter(move |s| s.covers(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryTransport;

    const MONITOR: &str = "/org/eclipse/bluechi/monitor/1";

    fn registry() -> (Arc<MemoryTransport>, InterestRegistry) {
        let transport = Arc::new(MemoryTransport::new(BusConfig::default()));
        let registry = InterestRegistry::new(transport.clone(), BusConfig::default());
        (transport, registry)
    }

    fn subscription(id: u32, node: &str, unit: &str) -> Subscription {
        Subscription {
            id: SubscriptionId(id),
            node: node.parse().unwrap(),
            unit: unit.parse().unwrap(),
        }
    }

    fn appeared(node: &str, unit: &str) -> LifecycleEvent {
        LifecycleEvent::UnitAppeared {
            node_name: node.to_string(),
            unit_name: unit.to_string(),
            reason: "real".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_monitor_filters() {
        let (transport, mut registry) = registry();
        assert!(!registry.has_monitor_filters(MONITOR));

        registry.register_monitor_filters(MONITOR).await.unwrap();

        assert!(registry.has_monitor_filters(MONITOR));
        assert!(!registry.has_monitor_filters("/org/eclipse/bluechi/monitor/2"));

        let filters = transport.filters();
        assert_eq!(filters.len(), 4);
        assert!(filters
            .iter()
            .all(|f| f.interface == "org.eclipse.bluechi.Monitor"
                && f.path.as_deref() == Some(MONITOR)));
        let members: Vec<_> = filters.iter().map(|f| f.member.as_str()).collect();
        assert_eq!(
            members,
            vec!["UnitNew", "UnitRemoved", "UnitPropertiesChanged", "UnitStateChanged"]
        );
    }

    #[tokio::test]
    async fn test_register_filter_is_idempotent() {
        let (transport, mut registry) = registry();
        registry
            .register_filter(SignalCategory::NodeProperties)
            .await
            .unwrap();
        registry
            .register_filter(SignalCategory::NodeProperties)
            .await
            .unwrap();

        let filters = transport.filters();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].interface, PROPERTIES_INTERFACE);
        assert_eq!(
            filters[0].path_namespace.as_deref(),
            Some("/org/eclipse/bluechi/node")
        );
    }

    #[tokio::test]
    async fn test_failed_registration_is_not_recorded() {
        let (transport, mut registry) = registry();
        transport.fail_on("AddMatch");

        let result = registry.register_filter(SignalCategory::NodeProperties).await;
        assert!(result.is_err());
        assert!(!registry.is_registered(&SignalCategory::NodeProperties));
    }

    #[tokio::test]
    async fn test_controller_properties_filter_is_scoped_to_controller() {
        let (transport, mut registry) = registry();
        registry
            .register_filter(SignalCategory::ControllerProperties)
            .await
            .unwrap();

        let filters = transport.filters();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].member, PROPERTIES_CHANGED_MEMBER);
        assert_eq!(filters[0].path.as_deref(), Some("/org/eclipse/bluechi"));
        assert!(filters[0].path_namespace.is_none());
        assert!(!registry.is_registered(&SignalCategory::NodeProperties));
    }

    #[test]
    fn test_concrete_patterns_match_exactly() {
        let sub = subscription(2, "worker1", "nginx.service");
        assert!(sub.covers(&appeared("worker1", "nginx.service")));
        assert!(!sub.covers(&appeared("worker2", "nginx.service")));
        assert!(!sub.covers(&appeared("worker1", "redis.service")));
        assert!(!sub.covers(&appeared("", "")));
    }

    #[test]
    fn test_wildcard_patterns_match_any_value() {
        let sub = subscription(2, "*", "*");
        assert!(sub.covers(&appeared("worker1", "nginx.service")));
        assert!(sub.covers(&appeared("", "")));

        let node_status = LifecycleEvent::NodeStatusChanged {
            node_name: "worker1".to_string(),
            new_status: "online".to_string(),
        };
        assert!(!sub.covers(&node_status));

        let system_status = LifecycleEvent::SystemStatusChanged {
            status: "up".to_string(),
        };
        assert!(!sub.covers(&system_status));
    }

    #[test]
    fn test_matching_and_forget() {
        let (_, mut registry) = registry();
        registry.record(subscription(2, "worker1", "*"));
        registry.record(subscription(3, "*", "nginx.service"));
        registry.record(subscription(4, "worker2", "redis.service"));

        let event = appeared("worker1", "nginx.service");
        let ids: Vec<_> = registry.matching(&event).map(|s| s.id).collect();
        assert_eq!(ids, vec![SubscriptionId(2), SubscriptionId(3)]);

        assert!(registry.forget(SubscriptionId(2)).is_some());
        assert!(registry.forget(SubscriptionId(2)).is_none());
        assert!(registry.get(SubscriptionId(3)).is_some());

        let ids: Vec<_> = registry.matching(&event).map(|s| s.id).collect();
        assert_eq!(ids, vec![SubscriptionId(3)]);

        registry.clear_subscriptions();
        assert!(registry.subscriptions().is_empty());
    }
}
