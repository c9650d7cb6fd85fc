//! Handshake state machine and payload assembly.
//!
//! The gateway pushes a `connect.challenge` event after the socket opens;
//! the client answers with one `connect` request echoing the nonce and goes
//! `AwaitingChallenge → Authenticating → Authenticated`. The client never
//! self-initiates, and a duplicate challenge while authenticating is
//! ignored so exactly one `connect` is sent per challenge instance.

use molt_core::{AuthParams, ClientInfo, ConnectParams, DeviceParams, HelloPayload};
use molt_settings::MoltSettings;
use uuid::Uuid;

use crate::credentials::Credentials;

/// Where the handshake currently stands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HandshakePhase {
    /// No socket, or the last one closed.
    #[default]
    Disconnected,
    /// Socket open, waiting for the gateway's challenge.
    AwaitingChallenge,
    /// `connect` sent, waiting for the hello response.
    Authenticating,
    /// Handshake accepted; requests may flow.
    Authenticated,
}

impl HandshakePhase {
    /// Whether non-handshake requests are allowed.
    pub fn is_authenticated(self) -> bool {
        self == Self::Authenticated
    }
}

/// Assemble the `connect` params for a challenge nonce.
///
/// Generates and records a device id when none is stored yet; the caller is
/// responsible for persisting the mutated credential set before (or while)
/// the request is in flight.
pub fn build_connect_params(
    settings: &MoltSettings,
    credentials: &mut Credentials,
    nonce: &str,
) -> ConnectParams {
    let device_id = credentials
        .device_id
        .get_or_insert_with(|| format!("{}-{}", settings.client.id, Uuid::new_v4()))
        .clone();

    ConnectParams {
        min_protocol: settings.protocol.min,
        max_protocol: settings.protocol.max,
        client: ClientInfo {
            id: settings.client.id.clone(),
            version: settings.client.version.clone(),
            platform: settings.client.platform.clone(),
            mode: settings.client.mode.clone(),
        },
        role: settings.role.clone(),
        scopes: settings.scopes.clone(),
        caps: Vec::new(),
        commands: Vec::new(),
        permissions: serde_json::json!({}),
        auth: AuthParams {
            token: credentials.token.clone().unwrap_or_default(),
            device_token: credentials.device_token.clone(),
        },
        device: DeviceParams {
            id: device_id,
            nonce: nonce.to_string(),
        },
    }
}

/// Fold a successful hello payload back into the credential set.
///
/// Returns `true` when the gateway rotated the device token, meaning the
/// set changed and must be persisted.
pub fn apply_hello(credentials: &mut Credentials, hello: &HelloPayload) -> bool {
    match &hello.device_token {
        Some(rotated) if credentials.device_token.as_deref() != Some(rotated.as_str()) => {
            credentials.device_token = Some(rotated.clone());
            true
        }
        _ => false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
