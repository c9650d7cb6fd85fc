//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` to match the settings
//! file's JSON shape. Each type implements [`Default`] with production
//! defaults, and `#[serde(default)]` lets the user file stay partial.

use serde::{Deserialize, Serialize};

/// Root settings type for the Molt client.
///
/// Loaded from `~/.molt/settings.json` with defaults applied for missing
/// fields and `MOLT_*` environment variables layered on top.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MoltSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Gateway connection settings.
    pub gateway: GatewaySettings,
    /// Protocol revision bounds offered during the handshake.
    pub protocol: ProtocolSettings,
    /// Client identity advertised during the handshake.
    pub client: ClientSettings,
    /// Role requested during the handshake.
    pub role: String,
    /// Scope set requested during the handshake.
    pub scopes: Vec<String>,
}

impl Default for MoltSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "molt".to_string(),
            gateway: GatewaySettings::default(),
            protocol: ProtocolSettings::default(),
            client: ClientSettings::default(),
            role: "operator".to_string(),
            scopes: vec![
                "operator.read".to_string(),
                "operator.write".to_string(),
                "operator.admin".to_string(),
            ],
        }
    }
}

/// Gateway connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Default gateway endpoint, used when the credential store has none.
    pub url: String,
    /// How long to wait for the socket to open, in milliseconds.
    pub connect_timeout_ms: u64,
    /// How long a request may stay in flight before timing out.
    pub request_timeout_ms: u64,
    /// Fixed delay before an automatic reconnect attempt.
    pub reconnect_delay_ms: u64,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:18789".to_string(),
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            reconnect_delay_ms: 3_000,
        }
    }
}

/// Protocol revision bounds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    /// Lowest supported revision.
    pub min: u32,
    /// Highest supported revision.
    pub max: u32,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self { min: 3, max: 3 }
    }
}

/// Client identity block sent in the `connect` request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Stable client identifier.
    pub id: String,
    /// Client version string.
    pub version: String,
    /// Host platform; defaults to the compile-time OS.
    pub platform: String,
    /// Operating mode.
    pub mode: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            id: "molt".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: std::env::consts::OS.to_string(),
            mode: "operator".to_string(),
        }
    }
}
