//! Handshake payload types.
//!
//! The gateway opens every connection by pushing a `connect.challenge` event.
//! The client answers with a single `connect` request whose params are
//! [`ConnectParams`]; the response payload is [`HelloPayload`], which marks
//! the handshake outcome and may rotate the device token.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Params of the `connect` request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    /// Lowest protocol revision the client speaks.
    pub min_protocol: u32,
    /// Highest protocol revision the client speaks.
    pub max_protocol: u32,
    /// Client identity.
    pub client: ClientInfo,
    /// Requested role (e.g. `operator`).
    pub role: String,
    /// Requested scope set.
    pub scopes: Vec<String>,
    /// Advertised capabilities.
    pub caps: Vec<String>,
    /// Advertised commands.
    pub commands: Vec<String>,
    /// Advertised permission map.
    pub permissions: Value,
    /// Authentication block.
    pub auth: AuthParams,
    /// Device identity echoing the challenge nonce.
    pub device: DeviceParams,
}

/// Client identity block inside [`ConnectParams`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Stable client identifier (e.g. `molt-cli`).
    pub id: String,
    /// Client version string.
    pub version: String,
    /// Host platform (e.g. `linux`, `macos`).
    pub platform: String,
    /// Operating mode (e.g. `operator`).
    pub mode: String,
}

/// Authentication block inside [`ConnectParams`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthParams {
    /// Shared gateway token.
    pub token: String,
    /// Device token from a previous handshake, when one is stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
}

/// Device block inside [`ConnectParams`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceParams {
    /// Persistent device identifier.
    pub id: String,
    /// Nonce received in the `connect.challenge` event, echoed back.
    pub nonce: String,
}

/// Payload of the `connect.challenge` event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChallengePayload {
    /// One-time nonce to echo in [`DeviceParams`].
    pub nonce: String,
    /// Additional challenge fields, ignored but preserved.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Payload of the response to `connect`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    /// Handshake outcome marker; `hello-ok` on success.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Rotated device token to persist for the next handshake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_token: Option<String>,
    /// Protocol revision the gateway settled on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<u32>,
    /// Anything else the gateway included.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl HelloPayload {
    /// Whether the payload marks a successful handshake.
    pub fn is_hello_ok(&self) -> bool {
        self.kind == "hello-ok"
    }
}
