//! Error types for the LiveGo client

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine code used when a non-success response carries no parseable body.
pub const HTTP_ERROR: &str = "HTTP_ERROR";

/// Machine code used when the request never produced a response.
pub const NETWORK_ERROR: &str = "NETWORK_ERROR";

/// Structured error body returned by the server (or synthesized locally).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable error code, e.g. `"COMPONENT_NOT_FOUND"`
    pub error: String,
    /// Human-readable message
    pub message: String,
    /// Numeric code, usually the HTTP status
    pub code: i64,
    /// Optional extra details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, serde_json::Value>>,
}

impl ErrorPayload {
    pub fn new(error: impl Into<String>, message: impl Into<String>, code: i64) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            code,
            details: None,
        }
    }

    /// Payload for a non-success response whose body could not be parsed.
    pub fn http_error(status: u16, status_text: impl Into<String>) -> Self {
        Self::new(HTTP_ERROR, status_text, i64::from(status))
    }

    /// Payload for a request that failed before any response arrived.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(NETWORK_ERROR, message, 0)
    }

    pub fn with_details(mut self, details: BTreeMap<String, serde_json::Value>) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.error, self.code, self.message)
    }
}

/// Main error type for LiveGo client operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LiveError {
    /// Network failure or non-success response from mount/update
    #[error("Transport error: {0}")]
    Transport(ErrorPayload),

    /// Response payload did not match the expected snapshot/effects shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// call/set/batch invoked before a successful mount (or after teardown)
    #[error("Component is not mounted")]
    NotMounted,

    /// Push frame payload was not valid JSON
    #[error("Stream parse error: {0}")]
    StreamParse(String),

    /// Push channel failed to open or dropped
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration could not be applied (bad URL, header, ...)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LiveError {
    /// The server payload, if this is a transport failure.
    pub fn payload(&self) -> Option<&ErrorPayload> {
        match self {
            LiveError::Transport(payload) => Some(payload),
            _ => None,
        }
    }
}

impl From<ErrorPayload> for LiveError {
    fn from(payload: ErrorPayload) -> Self {
        LiveError::Transport(payload)
    }
}

/// Mount surfaces the transport's error unchanged.
pub type MountError = LiveError;

/// Result type alias using LiveError
pub type LiveResult<T> = Result<T, LiveError>;
