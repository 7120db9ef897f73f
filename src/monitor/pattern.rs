//! Node and unit name patterns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BluewatchError;

/// The wildcard sentinel.
pub const WILDCARD: &str = "*";

/// A node or unit name pattern.
///
/// `*` matches any value, including the empty string. Any other value
/// matches only itself; there is no other wildcard syntax.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Pattern {
    /// Matches every value.
    #[default]
    Any,
    /// Matches exactly this value.
    Exact(String),
}

impl Pattern {
    /// Creates a pattern, rejecting the empty string.
    pub fn new(value: &str) -> Result<Self, BluewatchError> {
        value.parse()
    }

    /// Checks whether `value` matches.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Exact(expected) => expected == value,
        }
    }

    /// Returns true for `*`.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Pattern::Any)
    }

    /// The literal value, if this is not a wildcard.
    pub fn literal(&self) -> Option<&str> {
        match self {
            Pattern::Any => None,
            Pattern::Exact(value) => Some(value),
        }
    }

    /// Wire form of the pattern.
    pub fn as_str(&self) -> &str {
        match self {
            Pattern::Any => WILDCARD,
            Pattern::Exact(value) => value,
        }
    }
}

impl FromStr for Pattern {
    type Err = BluewatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err(BluewatchError::InvalidPattern {
                reason: "pattern must not be empty".to_string(),
            }),
            WILDCARD => Ok(Pattern::Any),
            other => Ok(Pattern::Exact(other.to_string())),
        }
    }
}

impl TryFrom<String> for Pattern {
    type Error = BluewatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.as_str().to_string()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
