//! Bus and object naming configuration.
//!
//! All bus names, object paths and interface names the client uses are
//! derived from one `BusConfig` value, so a deployment with different names
//! only needs a different configuration file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BluewatchError;

/// Standard property-change interface.
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Member name of the property-change signal.
pub const PROPERTIES_CHANGED_MEMBER: &str = "PropertiesChanged";

/// Which message bus to connect to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// The system bus.
    #[default]
    System,
    /// The user session bus.
    Session,
}

impl FromStr for BusKind {
    type Err = BluewatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(BusKind::System),
            "session" | "user" => Ok(BusKind::Session),
            _ => Err(BluewatchError::config(format!("Unknown bus kind: {}", s))),
        }
    }
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusKind::System => write!(f, "system"),
            BusKind::Session => write!(f, "session"),
        }
    }
}

/// Bus and object naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Bus to connect to.
    pub kind: BusKind,

    /// Well-known bus name of the controller.
    pub service_name: String,

    /// Object path of the controller.
    pub object_path: String,

    /// Prefix shared by the controller, monitor and node interfaces.
    pub interface_prefix: String,

    /// Node objects live at this prefix followed by the node name.
    pub node_path_prefix: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            kind: BusKind::System,
            service_name: "org.eclipse.bluechi".to_string(),
            object_path: "/org/eclipse/bluechi".to_string(),
            interface_prefix: "org.eclipse.bluechi".to_string(),
            node_path_prefix: "/org/eclipse/bluechi/node/".to_string(),
        }
    }
}

impl BusConfig {
    /// Interface of the controller object.
    pub fn controller_interface(&self) -> String {
        format!("{}.Controller", self.interface_prefix)
    }

    /// Interface of monitor objects.
    pub fn monitor_interface(&self) -> String {
        format!("{}.Monitor", self.interface_prefix)
    }

    /// Interface of node objects.
    pub fn node_interface(&self) -> String {
        format!("{}.Node", self.interface_prefix)
    }

    /// Recovers the node name from a node object path.
    ///
    /// Returns `None` if the path is not under the node prefix or names no node.
    pub fn node_name_from_path<'a>(&self, path: &'a str) -> Option<&'a str> {
        path.strip_prefix(self.node_path_prefix.as_str())
            .filter(|name| !name.is_empty())
    }

    /// The node prefix as a `path_namespace` match value (no trailing slash).
    pub fn node_path_namespace(&self) -> &str {
        let trimmed = self.node_path_prefix.trim_end_matches('/');
        if trimmed.is_empty() {
            "/"
        } else {
            trimmed
        }
    }

    pub(crate) fn validate(&self) -> Result<(), BluewatchError> {
        if self.service_name.is_empty() {
            return Err(BluewatchError::config("bus.service_name must not be empty"));
        }
        if self.interface_prefix.is_empty() {
            return Err(BluewatchError::config(
                "bus.interface_prefix must not be empty",
            ));
        }
        if !self.object_path.starts_with('/') {
            return Err(BluewatchError::config(
                "bus.object_path must be an absolute object path",
            ));
        }
        if !self.node_path_prefix.starts_with('/') {
            return Err(BluewatchError::config(
                "bus.node_path_prefix must be an absolute object path",
            ));
        }
        Ok(())
    }
}
