//! Default monitor subscription.

use serde::{Deserialize, Serialize};

use crate::monitor::Pattern;

/// Patterns used by `monitor-units` when none are given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Node name pattern.
    pub node: Pattern,

    /// Unit name pattern.
    pub unit: Pattern,
}
