//! # molt-link
//!
//! Gateway client protocol engine.
//!
//! One [`GatewayClient`] owns one persistent WebSocket to the gateway and
//! multiplexes everything over it:
//!
//! - **Transport** — socket ownership, silent drop outside the open state
//! - **Handshake** — challenge/response with device-token rotation
//! - **Correlator** — concurrent request/response matching with timeouts
//! - **Router** — server-pushed events fanned out to named subscribers
//! - **Cache** — best-effort snapshots of sessions/agents/models/channels
//! - **Reconnect** — fixed-delay retry after closure, suppressed by manual
//!   disconnect
//!
//! # Usage
//!
//! ```no_run
//! use molt_link::{FileCredentialStore, GatewayClient};
//! use molt_settings::MoltSettings;
//!
//! # async fn run() -> Result<(), molt_link::LinkError> {
//! let client = GatewayClient::new(MoltSettings::default(), FileCredentialStore::default_location());
//! client.connect().await?;
//! let sessions = client.sessions_list().await?;
//! println!("{} sessions", sessions.sessions.len());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod api;
pub mod cache;
pub mod client;
pub mod correlator;
pub mod credentials;
pub mod errors;
pub mod handshake;
pub mod reconnect;
pub mod router;
pub mod transport;

pub use cache::{ResourceSnapshot, SnapshotUpdate};
pub use client::{CHALLENGE_EVENT, ConnectionStatus, GatewayClient};
pub use credentials::{
    CredentialError, CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore,
};
pub use errors::LinkError;
pub use handshake::HandshakePhase;
pub use router::SubscriptionId;
pub use transport::{Transport, TransportEvent};
