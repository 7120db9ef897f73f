//! Lifecycle events and the monitor signals they are decoded from.

use serde::Serialize;
use std::fmt;

/// Signals emitted by a monitor object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MonitorSignal {
    /// A unit appeared on a node.
    UnitNew,
    /// A unit was removed from a node.
    UnitRemoved,
    /// Properties of a unit changed.
    UnitPropertiesChanged,
    /// Active or sub state of a unit changed.
    UnitStateChanged,
}

impl MonitorSignal {
    /// All monitor signals a subscription delivers.
    pub const ALL: [MonitorSignal; 4] = [
        MonitorSignal::UnitNew,
        MonitorSignal::UnitRemoved,
        MonitorSignal::UnitPropertiesChanged,
        MonitorSignal::UnitStateChanged,
    ];

    /// Signal member name on the bus.
    pub fn member(&self) -> &'static str {
        match self {
            MonitorSignal::UnitNew => "UnitNew",
            MonitorSignal::UnitRemoved => "UnitRemoved",
            MonitorSignal::UnitPropertiesChanged => "UnitPropertiesChanged",
            MonitorSignal::UnitStateChanged => "UnitStateChanged",
        }
    }

    /// Looks a signal up by the suffix of its name.
    ///
    /// Accepts a bare member (`UnitNew`) as well as a qualified name
    /// (`org.eclipse.bluechi.Monitor.UnitNew`).
    pub fn from_signal_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|signal| name.ends_with(signal.member()))
    }

    /// String fields after the node name: (unit, reason), (unit, interface)
    /// or (unit, active state, sub state, reason).
    pub(crate) fn field_count(&self) -> usize {
        match self {
            MonitorSignal::UnitNew
            | MonitorSignal::UnitRemoved
            | MonitorSignal::UnitPropertiesChanged => 2,
            MonitorSignal::UnitStateChanged => 4,
        }
    }
}

impl fmt::Display for MonitorSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.member())
    }
}

/// A typed lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A unit appeared on a node.
    UnitAppeared {
        node_name: String,
        unit_name: String,
        reason: String,
    },
    /// A unit was removed from a node.
    UnitRemoved {
        node_name: String,
        unit_name: String,
        reason: String,
    },
    /// Properties of a unit changed under an interface.
    UnitPropertiesChanged {
        node_name: String,
        unit_name: String,
        interface_name: String,
    },
    /// A unit changed state.
    UnitStateChanged {
        node_name: String,
        unit_name: String,
        active_state: String,
        sub_state: String,
        reason: String,
    },
    /// A node's connection status changed.
    NodeStatusChanged { node_name: String, new_status: String },
    /// The controller's overall system status changed.
    SystemStatusChanged { status: String },
}

impl LifecycleEvent {
    /// Name of the node the event concerns, if it concerns a node.
    pub fn node_name(&self) -> Option<&str> {
        match self {
            LifecycleEvent::UnitAppeared { node_name, .. }
            | LifecycleEvent::UnitRemoved { node_name, .. }
            | LifecycleEvent::UnitPropertiesChanged { node_name, .. }
            | LifecycleEvent::UnitStateChanged { node_name, .. }
            | LifecycleEvent::NodeStatusChanged { node_name, .. } => Some(node_name),
            LifecycleEvent::SystemStatusChanged { .. } => None,
        }
    }

    /// Name of the unit the event concerns, if it is a unit event.
    pub fn unit_name(&self) -> Option<&str> {
        match self {
            LifecycleEvent::UnitAppeared { unit_name, .. }
            | LifecycleEvent::UnitRemoved { unit_name, .. }
            | LifecycleEvent::UnitPropertiesChanged { unit_name, .. }
            | LifecycleEvent::UnitStateChanged { unit_name, .. } => Some(unit_name),
            LifecycleEvent::NodeStatusChanged { .. }
            | LifecycleEvent::SystemStatusChanged { .. } => None,
        }
    }

    /// Short kind name, as used in the JSON `event` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::UnitAppeared { .. } => "unit_appeared",
            LifecycleEvent::UnitRemoved { .. } => "unit_removed",
            LifecycleEvent::UnitPropertiesChanged { .. } => "unit_properties_changed",
            LifecycleEvent::UnitStateChanged { .. } => "unit_state_changed",
            LifecycleEvent::NodeStatusChanged { .. } => "node_status_changed",
            LifecycleEvent::SystemStatusChanged { .. } => "system_status_changed",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::UnitAppeared {
                node_name,
                unit_name,
                reason,
            } => write!(
                f,
                "New Unit {} on node {}, reason: {}",
                unit_name, node_name, reason
            ),
            LifecycleEvent::UnitRemoved {
                node_name,
                unit_name,
                reason,
            } => write!(
                f,
                "Removed Unit {} on node {}, reason: {}",
                unit_name, node_name, reason
            ),
            LifecycleEvent::UnitPropertiesChanged {
                node_name,
                unit_name,
                interface_name,
            } => write!(
                f,
                "Unit {} on node {} changed for iface {}",
                unit_name, node_name, interface_name
            ),
            LifecycleEvent::UnitStateChanged {
                node_name,
                unit_name,
                active_state,
                sub_state,
                reason,
            } => write!(
                f,
                "Unit {} on node {} changed to state ({}, {}), reason: {}",
                unit_name, node_name, active_state, sub_state, reason
            ),
            LifecycleEvent::NodeStatusChanged {
                node_name,
                new_status,
            } => write!(f, "Node {}: {}", node_name, new_status),
            LifecycleEvent::SystemStatusChanged { status } => {
                write!(f, "System status: {}", status)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_signal_members() {
        for signal in MonitorSignal::ALL {
            assert_eq!(MonitorSignal::from_signal_name(signal.member()), Some(signal));
        }
        assert_eq!(MonitorSignal::from_signal_name("PeerRemoved"), None);
        assert_eq!(MonitorSignal::from_signal_name("unitnew"), None);
        assert_eq!(MonitorSignal::from_signal_name("UnitNewer"), None);
    }

    #[test]
    fn test_monitor_signal_suffix_match() {
        assert_eq!(
            MonitorSignal::from_signal_name("org.eclipse.bluechi.Monitor.UnitStateChanged"),
            Some(MonitorSignal::UnitStateChanged)
        );
        assert_eq!(
            MonitorSignal::from_signal_name("org.eclipse.bluechi.Monitor.UnitPropertiesChanged"),
            Some(MonitorSignal::UnitPropertiesChanged)
        );
        assert_eq!(MonitorSignal::from_signal_name("PropertiesChanged"), None);
    }

    #[test]
    fn test_accessors() {
        let event = LifecycleEvent::UnitStateChanged {
            node_name: "worker1".to_string(),
            unit_name: "nginx.service".to_string(),
            active_state: "active".to_string(),
            sub_state: "running".to_string(),
            reason: "real".to_string(),
        };
        assert_eq!(event.node_name(), Some("worker1"));
        assert_eq!(event.unit_name(), Some("nginx.service"));
        assert_eq!(event.kind(), "unit_state_changed");

        let event = LifecycleEvent::NodeStatusChanged {
            node_name: "worker2".to_string(),
            new_status: "offline".to_string(),
        };
        assert_eq!(event.unit_name(), None);
        assert_eq!(event.node_name(), Some("worker2"));

        let event = LifecycleEvent::SystemStatusChanged {
            status: "degraded".to_string(),
        };
        assert_eq!(event.node_name(), None);
        assert_eq!(event.unit_name(), None);
        assert_eq!(event.kind(), "system_status_changed");
        assert_eq!(event.to_string(), "System status: degraded");
    }

    #[test]
    fn test_display() {
        let event = LifecycleEvent::UnitAppeared {
            node_name: "worker1".to_string(),
            unit_name: "nginx.service".to_string(),
            reason: "dependency".to_string(),
        };
        assert_eq!(
            event.to_string(),
            "New Unit nginx.service on node worker1, reason: dependency"
        );

        let event = LifecycleEvent::UnitStateChanged {
            node_name: "worker1".to_string(),
            unit_name: "nginx.service".to_string(),
            active_state: "active".to_string(),
            sub_state: "running".to_string(),
            reason: "real".to_string(),
        };
        assert_eq!(
            event.to_string(),
            "Unit nginx.service on node worker1 changed to state (active, running), reason: real"
        );
    }

    #[test]
    fn test_serialization_is_tagged() {
        let event = LifecycleEvent::NodeStatusChanged {
            node_name: "worker2".to_string(),
            new_status: "degraded".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "node_status_changed");
        assert_eq!(json["node_name"], "worker2");
        assert_eq!(json["new_status"], "degraded");
    }
}
