//! Event dispatcher.
//!
//! Classifies inbound signals into lifecycle events. Classification looks at
//! the emitting path and the signal name only; subscriptions narrow what the
//! controller sends, they play no part here.
//!
//! The receive loop consumes the signal stream strictly in delivery order and
//! hands each event to the handler before reading the next signal. A slow
//! handler therefore holds up the whole stream.

use crate::bus::{RawSignal, SignalReceiver, SignalValue};
use crate::config::{BusConfig, PROPERTIES_CHANGED_MEMBER, PROPERTIES_INTERFACE};
use crate::error::{BluewatchError, Result};
use crate::monitor::event::{LifecycleEvent, MonitorSignal};
use serde::Serialize;
use std::future::Future;
use tracing::{debug, info, trace, warn};

/// Key of the node status property.
pub const STATUS_PROPERTY: &str = "Status";

/// Counters reported when a receive loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Signals read from the stream.
    pub received: u64,
    /// Events handed to the handler.
    pub emitted: u64,
    /// Signals that produced no event.
    pub ignored: u64,
    /// Signals dropped because their payload was malformed.
    pub malformed: u64,
    /// Whether the loop ended because the transport closed the stream.
    pub stream_closed: bool,
}

/// Classifies raw signals into lifecycle events.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    bus: BusConfig,
    controller_interface: String,
    monitor_interface: String,
    node_interface: String,
    context_node: Option<String>,
}

impl EventDispatcher {
    /// Creates a dispatcher for the given bus names.
    pub fn new(bus: BusConfig) -> Self {
        Self {
            controller_interface: bus.controller_interface(),
            monitor_interface: bus.monitor_interface(),
            node_interface: bus.node_interface(),
            bus,
            context_node: None,
        }
    }

    /// Sets the node name assumed for monitor signals whose body omits it.
    pub fn with_context_node(mut self, node: Option<String>) -> Self {
        self.context_node = node;
        self
    }

    /// The context node, if any.
    pub fn context_node(&self) -> Option<&str> {
        self.context_node.as_deref()
    }

    /// Classifies one signal.
    ///
    /// Returns `Ok(None)` for signals that are not lifecycle events and
    /// `Err(MalformedSignal)` for recognized signals with an unexpected payload.
    pub fn classify(&self, signal: &RawSignal) -> Result<Option<LifecycleEvent>> {
        if self.is_controller_property_change(signal) {
            return self.classify_system_status(signal);
        }

        if self.is_node_property_change(signal) {
            return self.classify_node_status(signal);
        }

        if let Some(kind) = MonitorSignal::from_signal_name(&signal.member) {
            return self.decode_monitor_event(kind, signal).map(Some);
        }

        if signal.interface == self.monitor_interface {
            debug!(signal = %signal.name(), path = %signal.path, "Dropping unrecognized monitor signal");
        } else {
            trace!(signal = %signal.name(), "Ignoring signal");
        }
        Ok(None)
    }

    /// Classifies one signal, considering only node status changes.
    pub fn classify_node_status(&self, signal: &RawSignal) -> Result<Option<LifecycleEvent>> {
        if !self.is_node_property_change(signal) {
            return Ok(None);
        }

        let Some(node_name) = self.bus.node_name_from_path(&signal.path) else {
            return Err(BluewatchError::malformed(
                signal.name(),
                format!("path '{}' names no node", signal.path),
            ));
        };

        let Some(new_status) = changed_status(signal, &self.node_interface)? else {
            trace!(node = node_name, "Property change without node status");
            return Ok(None);
        };

        Ok(Some(LifecycleEvent::NodeStatusChanged {
            node_name: node_name.to_string(),
            new_status,
        }))
    }

    /// Classifies one signal, considering only controller status changes.
    pub fn classify_system_status(&self, signal: &RawSignal) -> Result<Option<LifecycleEvent>> {
        if !self.is_controller_property_change(signal) {
            return Ok(None);
        }

        let Some(status) = changed_status(signal, &self.controller_interface)? else {
            trace!("Property change without system status");
            return Ok(None);
        };

        Ok(Some(LifecycleEvent::SystemStatusChanged { status }))
    }

    /// Consumes `signals` until the stream closes or `shutdown` completes.
    pub async fn run<F, S>(&self, signals: &mut SignalReceiver, shutdown: S, handler: F) -> DispatchStats
    where
        F: FnMut(LifecycleEvent),
        S: Future<Output = ()>,
    {
        receive_loop(signals, shutdown, |signal| self.classify(signal), handler).await
    }

    fn is_node_property_change(&self, signal: &RawSignal) -> bool {
        is_property_change(signal) && signal.path.starts_with(self.bus.node_path_prefix.as_str())
    }

    fn is_controller_property_change(&self, signal: &RawSignal) -> bool {
        is_property_change(signal) && signal.path == self.bus.object_path
    }

    /// Decodes the positional payload of a monitor signal.
    ///
    /// The body carries the node name followed by the signal's string fields.
    /// When a context node is set, a body without the leading node name is
    /// accepted as well.
    fn decode_monitor_event(&self, kind: MonitorSignal, signal: &RawSignal) -> Result<LifecycleEvent> {
        let wanted = kind.field_count();
        let strings: Vec<&str> = signal
            .body
            .iter()
            .map_while(SignalValue::as_str)
            .collect();

        let (node_name, fields) = if strings.len() > wanted {
            (strings[0], &strings[1..=wanted])
        } else if strings.len() == wanted {
            match self.context_node.as_deref() {
                Some(node) => (node, &strings[..]),
                None => {
                    return Err(BluewatchError::malformed(
                        signal.name(),
                        format!("expected node name and {} string fields", wanted),
                    ))
                }
            }
        } else {
            return Err(BluewatchError::malformed(
                signal.name(),
                format!(
                    "expected {} leading string fields, found {}",
                    wanted + 1,
                    strings.len()
                ),
            ));
        };

        let node_name = node_name.to_string();
        let field = |index: usize| fields[index].to_string();

        Ok(match kind {
            MonitorSignal::UnitNew => LifecycleEvent::UnitAppeared {
                node_name,
                unit_name: field(0),
                reason: field(1),
            },
            MonitorSignal::UnitRemoved => LifecycleEvent::UnitRemoved {
                node_name,
                unit_name: field(0),
                reason: field(1),
            },
            MonitorSignal::UnitPropertiesChanged => LifecycleEvent::UnitPropertiesChanged {
                node_name,
                unit_name: field(0),
                interface_name: field(1),
            },
            MonitorSignal::UnitStateChanged => LifecycleEvent::UnitStateChanged {
                node_name,
                unit_name: field(0),
                active_state: field(1),
                sub_state: field(2),
                reason: field(3),
            },
        })
    }
}

fn is_property_change(signal: &RawSignal) -> bool {
    signal.interface == PROPERTIES_INTERFACE && signal.member == PROPERTIES_CHANGED_MEMBER
}

/// Reads the `Status` entry of a property change on `interface`.
///
/// `Ok(None)` when the change is for another interface or does not touch
/// the status.
fn changed_status(signal: &RawSignal, interface: &str) -> Result<Option<String>> {
    let changed_interface = signal
        .body
        .first()
        .and_then(SignalValue::as_str)
        .ok_or_else(|| BluewatchError::malformed(signal.name(), "body[0] is not an interface name"))?;
    if changed_interface != interface {
        trace!(interface = changed_interface, path = %signal.path, "Ignoring property change");
        return Ok(None);
    }

    let changed = signal
        .body
        .get(1)
        .and_then(SignalValue::as_map)
        .ok_or_else(|| {
            let found = signal.body.get(1).map_or("nothing", SignalValue::kind);
            BluewatchError::malformed(
                signal.name(),
                format!("body[1] should be a property map, found {}", found),
            )
        })?;

    let Some(status) = changed.get(STATUS_PROPERTY) else {
        return Ok(None);
    };

    status.as_str().map(|s| Some(s.to_string())).ok_or_else(|| {
        BluewatchError::malformed(
            signal.name(),
            format!(
                "{} should be a string, found {}",
                STATUS_PROPERTY,
                status.unwrap_variant().kind()
            ),
        )
    })
}

/// Single-consumer receive loop shared by the dispatcher and the node watcher.
pub(crate) async fn receive_loop<C, F, S>(
    signals: &mut SignalReceiver,
    shutdown: S,
    mut classify: C,
    mut handler: F,
) -> DispatchStats
where
    C: FnMut(&RawSignal) -> Result<Option<LifecycleEvent>>,
    F: FnMut(LifecycleEvent),
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut stats = DispatchStats::default();

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => {
                info!("Shutdown requested, stopping receive loop");
                break;
            }

            next = signals.recv() => {
                let Some(signal) = next else {
                    info!("Signal stream closed");
                    stats.stream_closed = true;
                    break;
                };
                stats.received += 1;

                match classify(&signal) {
                    Ok(Some(event)) => {
                        stats.emitted += 1;
                        debug!(event = event.kind(), node = ?event.node_name(), "Dispatching event");
                        handler(event);
                    }
                    Ok(None) => stats.ignored += 1,
                    Err(e) => {
                        stats.malformed += 1;
                        warn!(error = %e, path = %signal.path, "Dropping malformed signal");
                    }
                }
            }
        }
    }

    info!(
        received = stats.received,
        emitted = stats.emitted,
        ignored = stats.ignored,
        malformed = stats.malformed,
        "Receive loop finished"
    );
    stats
}
