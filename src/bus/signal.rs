//! Transport-level value model.
//!
//! Payloads arrive untyped; `SignalValue` keeps their structure so that
//! decoding into typed events can check every shape explicitly.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{BluewatchError, Result};

/// An untyped payload value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SignalValue {
    /// A string.
    Str(String),
    /// An object path.
    ObjectPath(String),
    /// A boolean.
    Bool(bool),
    /// A signed integer of any width.
    Int(i64),
    /// An unsigned integer of any width.
    UInt(u64),
    /// A floating point number.
    Double(f64),
    /// A homogeneous array.
    Array(Vec<SignalValue>),
    /// A string-keyed dictionary, e.g. changed properties.
    Map(BTreeMap<String, SignalValue>),
    /// A struct.
    Struct(Vec<SignalValue>),
    /// A value wrapped in a variant.
    Variant(Box<SignalValue>),
    /// A value of a type the client does not decode; holds its signature.
    Unsupported(String),
}

impl SignalValue {
    /// Strips any number of variant wrappers.
    pub fn unwrap_variant(&self) -> &SignalValue {
        let mut value = self;
        while let SignalValue::Variant(inner) = value {
            value = inner;
        }
        value
    }

    /// String content of a string or object path.
    pub fn as_str(&self) -> Option<&str> {
        match self.unwrap_variant() {
            SignalValue::Str(s) | SignalValue::ObjectPath(s) => Some(s),
            _ => None,
        }
    }

    /// Unsigned integer content.
    pub fn as_u64(&self) -> Option<u64> {
        match self.unwrap_variant() {
            SignalValue::UInt(n) => Some(*n),
            SignalValue::Int(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Dictionary content.
    pub fn as_map(&self) -> Option<&BTreeMap<String, SignalValue>> {
        match self.unwrap_variant() {
            SignalValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Members of an array or struct.
    pub fn as_slice(&self) -> Option<&[SignalValue]> {
        match self.unwrap_variant() {
            SignalValue::Array(items) | SignalValue::Struct(items) => Some(items),
            _ => None,
        }
    }

    /// Short name of the value's shape, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalValue::Str(_) => "string",
            SignalValue::ObjectPath(_) => "object path",
            SignalValue::Bool(_) => "boolean",
            SignalValue::Int(_) => "integer",
            SignalValue::UInt(_) => "unsigned integer",
            SignalValue::Double(_) => "double",
            SignalValue::Array(_) => "array",
            SignalValue::Map(_) => "map",
            SignalValue::Struct(_) => "struct",
            SignalValue::Variant(_) => "variant",
            SignalValue::Unsupported(_) => "unsupported",
        }
    }
}

impl From<&str> for SignalValue {
    fn from(s: &str) -> Self {
        SignalValue::Str(s.to_string())
    }
}

impl From<String> for SignalValue {
    fn from(s: String) -> Self {
        SignalValue::Str(s)
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalValue::Str(s) | SignalValue::ObjectPath(s) => write!(f, "{}", s),
            SignalValue::Bool(b) => write!(f, "{}", b),
            SignalValue::Int(n) => write!(f, "{}", n),
            SignalValue::UInt(n) => write!(f, "{}", n),
            SignalValue::Double(n) => write!(f, "{}", n),
            SignalValue::Variant(inner) => write!(f, "{}", inner),
            SignalValue::Unsupported(sig) => write!(f, "<{}>", sig),
            other => write!(
                f,
                "{}",
                serde_json::to_string(other).unwrap_or_else(|_| other.kind().to_string())
            ),
        }
    }
}

/// A signal as delivered by the transport.
///
/// Consumed by classification and not retained afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSignal {
    /// Interface that declared the signal.
    pub interface: String,
    /// Signal member name.
    pub member: String,
    /// Emitting object path.
    pub path: String,
    /// Positional payload.
    pub body: Vec<SignalValue>,
}

impl RawSignal {
    /// Creates a signal.
    pub fn new(
        interface: impl Into<String>,
        member: impl Into<String>,
        path: impl Into<String>,
        body: Vec<SignalValue>,
    ) -> Self {
        Self {
            interface: interface.into(),
            member: member.into(),
            path: path.into(),
            body,
        }
    }

    /// Fully qualified name, `interface.member`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.interface, self.member)
    }
}

/// A signal match rule registered with the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalFilter {
    /// Interface to match.
    pub interface: String,
    /// Member to match.
    pub member: String,
    /// Exact emitting path, if scoped to one object.
    pub path: Option<String>,
    /// Path namespace, if scoped to a subtree.
    pub path_namespace: Option<String>,
}

impl SignalFilter {
    /// Creates an unscoped filter.
    pub fn new(interface: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            member: member.into(),
            path: None,
            path_namespace: None,
        }
    }

    /// Restricts the filter to one object path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Restricts the filter to an object path subtree.
    pub fn with_path_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.path_namespace = Some(namespace.into());
        self
    }

    /// Renders the bus match rule string.
    pub fn match_rule(&self) -> String {
        let mut rule = format!(
            "type='signal',interface='{}',member='{}'",
            self.interface, self.member
        );
        if let Some(path) = &self.path {
            rule.push_str(&format!(",path='{}'", path));
        }
        if let Some(namespace) = &self.path_namespace {
            rule.push_str(&format!(",path_namespace='{}'", namespace));
        }
        rule
    }
}

impl fmt::Display for SignalFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.interface, self.member)
    }
}

/// A node as listed by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    /// Node name.
    pub name: String,
    /// Node object path.
    pub object_path: String,
    /// Connection status, e.g. `online`.
    pub status: String,
}

impl NodeInfo {
    /// Decodes one entry of a node listing.
    ///
    /// The entry is a struct whose first three members are name, object path
    /// and status; trailing members are ignored.
    pub fn from_value(value: &SignalValue) -> Result<Self> {
        let fields = value.as_slice().ok_or_else(|| {
            BluewatchError::remote_call(
                "ListNodes",
                format!("expected a struct per node, got {}", value.kind()),
            )
        })?;

        let field = |index: usize, name: &str| -> Result<String> {
            fields
                .get(index)
                .and_then(SignalValue::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    BluewatchError::remote_call(
                        "ListNodes",
                        format!("node entry is missing {} at position {}", name, index),
                    )
                })
        };

        Ok(Self {
            name: field(0, "name")?,
            object_path: field(1, "object path")?,
            status: field(2, "status")?,
        })
    }

    /// Decodes a full ListNodes reply body.
    pub fn list_from_body(body: &[SignalValue]) -> Result<Vec<Self>> {
        let entries = body.first().and_then(SignalValue::as_slice).ok_or_else(|| {
            BluewatchError::remote_call("ListNodes", "expected an array of nodes")
        })?;

        entries.iter().map(Self::from_value).collect()
    }
}
