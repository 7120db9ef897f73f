//! Error types and error handling for bluewatch.
//!
//! This module defines all error types used throughout the application,
//! including stable error codes and CLI exit codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error codes, one per failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// E001: Configuration file is invalid
    #[serde(rename = "E001")]
    ConfigInvalid,

    /// E002: Bus connection or signal filter registration failed
    #[serde(rename = "E002")]
    TransportError,

    /// E003: A remote method call failed or returned an error reply
    #[serde(rename = "E003")]
    RemoteCallError,

    /// E004: A signal payload did not have the expected shape
    #[serde(rename = "E004")]
    MalformedSignal,

    /// E005: A node or unit pattern is invalid
    #[serde(rename = "E005")]
    InvalidPattern,

    /// E006: Operation is not valid in the current session state
    #[serde(rename = "E006")]
    SessionState,

    /// E007: Writing or encoding command output failed
    #[serde(rename = "E007")]
    OutputError,
}

impl ErrorCode {
    /// Returns the error code as a string (e.g., "E001").
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalid => "E001",
            ErrorCode::TransportError => "E002",
            ErrorCode::RemoteCallError => "E003",
            ErrorCode::MalformedSignal => "E004",
            ErrorCode::InvalidPattern => "E005",
            ErrorCode::SessionState => "E006",
            ErrorCode::OutputError => "E007",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// CLI exit codes.
pub mod exit_code {
    /// Success
    pub const SUCCESS: i32 = 0;
    /// General error
    pub const GENERAL_ERROR: i32 = 1;
    /// Configuration error
    pub const CONFIG_ERROR: i32 = 2;
    /// Bus transport error
    pub const TRANSPORT_ERROR: i32 = 3;
    /// Remote call error
    pub const REMOTE_CALL_ERROR: i32 = 4;
    /// Command line argument error
    pub const CLI_ERROR: i32 = 64;
}

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// The main error type for bluewatch.
#[derive(Debug, Error)]
pub enum BluewatchError {
    /// Configuration file is invalid or cannot be loaded.
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// Connecting to the bus or registering a signal filter failed.
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// A remote method call failed.
    #[error("Remote call {method} failed: {message}")]
    RemoteCall {
        method: String,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    /// A signal payload did not match the shape expected for its name.
    #[error("Malformed signal {signal}: {reason}")]
    MalformedSignal { signal: String, reason: String },

    /// A node or unit pattern is invalid.
    #[error("Invalid pattern: {reason}")]
    InvalidPattern { reason: String },

    /// The monitor session is not in a state that allows the operation.
    #[error("Session error: {message}")]
    Session { message: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON encoding error.
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BluewatchError {
    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            BluewatchError::Config { .. } => ErrorCode::ConfigInvalid,
            BluewatchError::Transport { .. } => ErrorCode::TransportError,
            BluewatchError::RemoteCall { .. } => ErrorCode::RemoteCallError,
            BluewatchError::MalformedSignal { .. } => ErrorCode::MalformedSignal,
            BluewatchError::InvalidPattern { .. } => ErrorCode::InvalidPattern,
            BluewatchError::Session { .. } => ErrorCode::SessionState,
            BluewatchError::Io(_) | BluewatchError::Json(_) => ErrorCode::OutputError,
            BluewatchError::Yaml(_) => ErrorCode::ConfigInvalid,
        }
    }

    /// Returns the CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            BluewatchError::Config { .. } | BluewatchError::Yaml(_) => exit_code::CONFIG_ERROR,
            BluewatchError::InvalidPattern { .. } => exit_code::CLI_ERROR,
            BluewatchError::Transport { .. } => exit_code::TRANSPORT_ERROR,
            BluewatchError::RemoteCall { .. } => exit_code::REMOTE_CALL_ERROR,
            _ => exit_code::GENERAL_ERROR,
        }
    }

    /// Creates a configuration error with a message.
    pub fn config(message: impl Into<String>) -> Self {
        BluewatchError::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a configuration error with a message and source.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        BluewatchError::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a transport error with a message.
    pub fn transport(message: impl Into<String>) -> Self {
        BluewatchError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transport error with a message and source.
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        BluewatchError::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a remote call error.
    pub fn remote_call(method: impl Into<String>, message: impl Into<String>) -> Self {
        BluewatchError::RemoteCall {
            method: method.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a remote call error with a source.
    pub fn remote_call_with_source(
        method: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        BluewatchError::RemoteCall {
            method: method.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a malformed signal error.
    pub fn malformed(signal: impl Into<String>, reason: impl Into<String>) -> Self {
        BluewatchError::MalformedSignal {
            signal: signal.into(),
            reason: reason.into(),
        }
    }

    /// Creates a session state error.
    pub fn session(message: impl Into<String>) -> Self {
        BluewatchError::Session {
            message: message.into(),
        }
    }
}

/// Result type alias for bluewatch operations.
pub type Result<T> = std::result::Result<T, BluewatchError>;
