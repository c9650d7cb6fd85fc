//! # molt-core
//!
//! Wire-format vocabulary for the Molt gateway client.
//!
//! This crate defines the shapes that travel over the gateway WebSocket and
//! the typed records the rest of the workspace consumes:
//!
//! - **Frames**: the `req`/`res`/`event` envelope ([`Frame`]) and the error
//!   body carried by failed responses ([`ErrorDetail`])
//! - **Handshake**: the `connect` request payload ([`ConnectParams`]) and the
//!   challenge/hello payloads that bracket it
//! - **Records**: typed session/agent/model/channel records with opaque
//!   passthrough for fields the gateway adds later
//!
//! No I/O lives here; everything is plain data plus serde.

#![deny(unsafe_code)]

pub mod connect;
pub mod frames;
pub mod records;

pub use connect::{
    AuthParams, ChallengePayload, ClientInfo, ConnectParams, DeviceParams, HelloPayload,
};
pub use frames::{ErrorDetail, EventFrame, Frame, RequestFrame, ResponseFrame};
pub use records::{
    AgentFilePayload, AgentFileRecord, AgentFilesPayload, AgentRecord, AgentsPayload,
    ChannelHealth, ChannelsPayload, ChatEntry, ChatHistoryPayload, ModelRecord, ModelsPayload,
    SessionRecord, SessionsPayload,
};
