//! Gateway wire-format frames.
//!
//! Every message on the socket is one JSON object tagged by `type`:
//! `req` (client request), `res` (response), or `event` (server push).
//! Frames the client cannot parse are dropped by the engine, never surfaced.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single wire frame, tagged by the `type` field.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Client-initiated request.
    Req(RequestFrame),
    /// Response correlated to an earlier request by `id`.
    Res(ResponseFrame),
    /// Server-pushed event, not tied to any request.
    Event(EventFrame),
}

impl Frame {
    /// Parse a raw text frame.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Serialize for the wire.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Outgoing request envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlation id, unique for the client's process lifetime.
    pub id: String,
    /// Method name (e.g. `sessions.list`).
    pub method: String,
    /// Parameters object.
    #[serde(default)]
    pub params: Value,
}

impl RequestFrame {
    /// Build a request frame.
    pub fn new(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// Inbound response envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseFrame {
    /// Echoed correlation id.
    pub id: String,
    /// Whether the call succeeded.
    pub ok: bool,
    /// Result payload (present when `ok == true`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Error body (present when `ok == false`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

/// Server-pushed event envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventFrame {
    /// Event name (e.g. `agent`, `connect.challenge`).
    pub event: String,
    /// Event payload, forwarded verbatim to subscribers.
    #[serde(default)]
    pub payload: Value,
}

/// Error body inside a failed response.
///
/// The gateway's error object is passed through unmodified; fields beyond
/// `code`/`message` survive in `extra`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code, when the gateway sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Any additional fields the gateway attached.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) if !self.message.is_empty() => write!(f, "[{code}] {}", self.message),
            Some(code) => write!(f, "[{code}]"),
            None if !self.message.is_empty() => f.write_str(&self.message),
            None => f.write_str("gateway error"),
        }
    }
}
