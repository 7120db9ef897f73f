//! D-Bus transport implementation.
//!
//! This transport uses zbus to talk to the controller over the system or
//! session bus. Replies and signal bodies are converted into `SignalValue`
//! trees so that decoding happens in one place regardless of transport.

use crate::bus::signal::{NodeInfo, RawSignal, SignalFilter, SignalValue};
use crate::bus::{BusTransport, SignalReceiver};
use crate::config::{BusConfig, BusKind};
use crate::error::{BluewatchError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use zbus::message::Type as MessageType;
use zbus::zvariant::{DynamicType, OwnedValue, Structure, Value};
use zbus::{Connection, Message, MessageStream};

const DBUS_SERVICE: &str = "org.freedesktop.DBus";
const DBUS_PATH: &str = "/org/freedesktop/DBus";

/// D-Bus transport for the controller API.
pub struct DbusTransport {
    connection: Connection,
    bus: BusConfig,
    stream_taken: AtomicBool,
}

impl DbusTransport {
    /// Connects to the bus selected by `bus.kind`.
    pub async fn connect(bus: &BusConfig) -> Result<Self> {
        let connection = match bus.kind {
            BusKind::System => Connection::system().await,
            BusKind::Session => Connection::session().await,
        }
        .map_err(|e| {
            BluewatchError::transport_with_source(
                format!("Failed to connect to {:?} bus", bus.kind),
                e,
            )
        })?;

        info!(
            bus = ?bus.kind,
            unique_name = ?connection.unique_name(),
            "Connected to message bus"
        );

        Ok(Self {
            connection,
            bus: bus.clone(),
            stream_taken: AtomicBool::new(false),
        })
    }

    /// Calls `method` on `path` and returns the reply body as values.
    async fn call<B>(&self, path: &str, interface: &str, method: &str, body: &B) -> Result<Vec<SignalValue>>
    where
        B: Serialize + DynamicType,
    {
        debug!(path = path, interface = interface, method = method, "Calling remote method");

        let reply = self
            .connection
            .call_method(
                Some(self.bus.service_name.as_str()),
                path,
                Some(interface),
                method,
                body,
            )
            .await
            .map_err(|e| BluewatchError::remote_call_with_source(method, e))?;

        body_values(&reply).map_err(|e| BluewatchError::remote_call_with_source(method, e))
    }

    fn first_value(method: &str, values: Vec<SignalValue>) -> Result<SignalValue> {
        values
            .into_iter()
            .next()
            .ok_or_else(|| BluewatchError::remote_call(method, "reply has an empty body"))
    }
}

#[async_trait]
impl BusTransport for DbusTransport {
    fn name(&self) -> &'static str {
        "dbus"
    }

    async fn add_signal_filter(&self, filter: &SignalFilter) -> Result<()> {
        let rule = filter.match_rule();
        debug!(rule = %rule, "Adding signal match rule");

        self.connection
            .call_method(
                Some(DBUS_SERVICE),
                DBUS_PATH,
                Some(DBUS_SERVICE),
                "AddMatch",
                &(rule.as_str(),),
            )
            .await
            .map_err(|e| {
                BluewatchError::transport_with_source(
                    format!("Failed to add signal filter {}", filter),
                    e,
                )
            })?;

        Ok(())
    }

    async fn signals(&self) -> Result<SignalReceiver> {
        if self.stream_taken.swap(true, Ordering::SeqCst) {
            return Err(BluewatchError::transport("Signal stream already taken"));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut stream = MessageStream::from(&self.connection);

        tokio::spawn(async move {
            while let Some(next) = stream.next().await {
                let message = match next {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(error = %e, "Failed to read message from bus");
                        continue;
                    }
                };

                if message.message_type() != MessageType::Signal {
                    continue;
                }

                let Some(signal) = raw_signal(&message) else {
                    continue;
                };

                if tx.send(signal).is_err() {
                    debug!("Signal receiver dropped, stopping forwarder");
                    return;
                }
            }
            info!("Bus message stream ended");
        });

        Ok(rx)
    }

    async fn create_monitor(&self) -> Result<String> {
        let values = self
            .call(
                &self.bus.object_path,
                &self.bus.controller_interface(),
                "CreateMonitor",
                &(),
            )
            .await?;

        let value = Self::first_value("CreateMonitor", values)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BluewatchError::remote_call("CreateMonitor", "reply is not an object path"))
    }

    async fn subscribe(&self, monitor: &str, node: &str, unit: &str) -> Result<u32> {
        let values = self
            .call(monitor, &self.bus.monitor_interface(), "Subscribe", &(node, unit))
            .await?;

        let value = Self::first_value("Subscribe", values)?;
        value
            .as_u64()
            .and_then(|id| u32::try_from(id).ok())
            .ok_or_else(|| BluewatchError::remote_call("Subscribe", "reply is not a subscription id"))
    }

    async fn unsubscribe(&self, monitor: &str, id: u32) -> Result<()> {
        self.call(monitor, &self.bus.monitor_interface(), "Unsubscribe", &(id,))
            .await?;
        Ok(())
    }

    async fn close_monitor(&self, monitor: &str) -> Result<()> {
        self.call(monitor, &self.bus.monitor_interface(), "Close", &())
            .await?;
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeInfo>> {
        let values = self
            .call(
                &self.bus.object_path,
                &self.bus.controller_interface(),
                "ListNodes",
                &(),
            )
            .await?;

        NodeInfo::list_from_body(&values)
    }

    async fn get_node(&self, name: &str) -> Result<String> {
        let values = self
            .call(
                &self.bus.object_path,
                &self.bus.controller_interface(),
                "GetNode",
                &(name,),
            )
            .await?;

        let value = Self::first_value("GetNode", values)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BluewatchError::remote_call("GetNode", "reply is not an object path"))
    }
}

/// Builds a `RawSignal` from a signal message; `None` if the header is incomplete.
fn raw_signal(message: &Message) -> Option<RawSignal> {
    let header = message.header();
    let interface = header.interface()?.to_string();
    let member = header.member()?.to_string();
    let path = header.path()?.to_string();

    let body = match body_values(message) {
        Ok(body) => body,
        Err(e) => {
            // Keep the signal so classification can report it; an empty body never decodes.
            warn!(interface = %interface, member = %member, error = %e, "Failed to decode signal body");
            Vec::new()
        }
    };

    Some(RawSignal {
        interface,
        member,
        path,
        body,
    })
}

/// Reads a message body as a list of untyped values.
fn body_values(message: &Message) -> zbus::Result<Vec<SignalValue>> {
    let body = message.body();
    if body.signature().to_string().is_empty() {
        return Ok(Vec::new());
    }

    let structure: Structure<'_> = body.deserialize()?;
    Ok(structure.into_fields().into_iter().map(convert).collect())
}

/// Converts a zvariant value into a `SignalValue`.
fn convert(value: Value<'_>) -> SignalValue {
    let signature = value.value_signature().to_string();

    match value {
        Value::Str(s) => SignalValue::Str(s.as_str().to_string()),
        Value::ObjectPath(p) => SignalValue::ObjectPath(p.as_str().to_string()),
        Value::Signature(s) => SignalValue::Str(s.to_string()),
        Value::Bool(b) => SignalValue::Bool(b),
        Value::U8(n) => SignalValue::UInt(n.into()),
        Value::U16(n) => SignalValue::UInt(n.into()),
        Value::U32(n) => SignalValue::UInt(n.into()),
        Value::U64(n) => SignalValue::UInt(n),
        Value::I16(n) => SignalValue::Int(n.into()),
        Value::I32(n) => SignalValue::Int(n.into()),
        Value::I64(n) => SignalValue::Int(n),
        Value::F64(n) => SignalValue::Double(n),
        Value::Value(inner) => SignalValue::Variant(Box::new(convert(*inner))),
        Value::Structure(s) => SignalValue::Struct(s.into_fields().into_iter().map(convert).collect()),
        Value::Array(array) => match Vec::<OwnedValue>::try_from(array) {
            Ok(items) => SignalValue::Array(items.into_iter().map(|v| convert(Value::from(v))).collect()),
            Err(_) => SignalValue::Unsupported(signature),
        },
        Value::Dict(dict) => match HashMap::<String, OwnedValue>::try_from(dict) {
            Ok(entries) => SignalValue::Map(
                entries
                    .into_iter()
                    .map(|(key, v)| (key, convert(Value::from(v))))
                    .collect::<BTreeMap<_, _>>(),
            ),
            Err(_) => SignalValue::Unsupported(signature),
        },
        _ => SignalValue::Unsupported(signature),
    }
}
