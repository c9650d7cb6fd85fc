//! Engine error types.
//!
//! Every public engine operation resolves asynchronously with `Ok` or one of
//! these variants; nothing panics and nothing is thrown synchronously. A
//! locally synthesized timeout and a gateway-reported failure share the same
//! error path so callers handle one failure shape.

use molt_core::ErrorDetail;
use thiserror::Error;

use crate::credentials::CredentialError;

/// Errors surfaced by the gateway client engine.
#[derive(Debug, Error)]
pub enum LinkError {
    /// No response arrived within the request timeout window. The only
    /// failure the correlator manufactures itself.
    #[error("request timed out: {method}")]
    Timeout {
        /// Method of the request that timed out.
        method: String,
    },

    /// The gateway answered with `ok: false`; the wire error is carried
    /// through unmodified.
    #[error("gateway error: {0}")]
    Gateway(ErrorDetail),

    /// The handshake completed but the gateway refused the session.
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// A request was attempted while the session is not authenticated.
    #[error("not connected to a gateway")]
    NotConnected,

    /// The engine was shut down while the request was in flight.
    #[error("connection closed")]
    ConnectionClosed,

    /// The socket could not be opened or failed mid-flight.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response payload did not match the expected shape.
    #[error("unexpected payload shape: {0}")]
    Decode(#[from] serde_json::Error),

    /// The credential store could not be read or written.
    #[error(transparent)]
    Credentials(#[from] CredentialError),
}

impl LinkError {
    /// Whether this is the locally synthesized timeout failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
