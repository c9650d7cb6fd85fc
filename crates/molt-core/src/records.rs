//! Typed resource records.
//!
//! The gateway owns these resources; the client only caches the last-fetched
//! snapshot. Known fields get typed access, everything else rides along in
//! each record's flattened `extra` map so newer gateways stay compatible.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One session as reported by `sessions.list`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Stable session key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    /// Display name, when the gateway assigned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Agent the session belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl SessionRecord {
    /// Best human-readable label for the session.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.session_key.as_deref())
            .unwrap_or("unknown")
    }
}

/// Payload of `sessions.list`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionsPayload {
    /// Sessions known to the gateway.
    #[serde(default)]
    pub sessions: Vec<SessionRecord>,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One agent as reported by `agents.list`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Agent identifier.
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Whether this is the default agent.
    #[serde(default)]
    pub default: bool,
    /// Model override, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Workspace directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Payload of `agents.list`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentsPayload {
    /// Agents configured on the gateway.
    #[serde(default)]
    pub agents: Vec<AgentRecord>,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One model as reported by `models.list`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelRecord {
    /// Model identifier.
    #[serde(default)]
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Provider the model belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Payload of `models.list`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ModelsPayload {
    /// Models the gateway can route to.
    #[serde(default)]
    pub models: Vec<ModelRecord>,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One channel as reported by `channels.status`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChannelHealth {
    /// Channel identifier.
    #[serde(default)]
    pub id: String,
    /// Channel status string (e.g. `connected`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Payload of `channels.status`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChannelsPayload {
    /// Channel health records.
    #[serde(default)]
    pub channels: Vec<ChannelHealth>,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One workspace file as reported by `agents.files.list`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentFileRecord {
    /// Path relative to the agent workspace.
    #[serde(default, alias = "name")]
    pub path: String,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Payload of `agents.files.list`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentFilesPayload {
    /// Files in the agent workspace.
    #[serde(default, alias = "entries")]
    pub files: Vec<AgentFileRecord>,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Payload of `agents.files.get`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentFilePayload {
    /// File contents.
    #[serde(default)]
    pub content: String,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// One chat transcript entry from `chat.history`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatEntry {
    /// Author role (`user` or `assistant`).
    #[serde(default)]
    pub role: String,
    /// Message text.
    #[serde(default, alias = "text")]
    pub content: String,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Payload of `chat.history`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChatHistoryPayload {
    /// Transcript entries, oldest first.
    #[serde(default, alias = "messages")]
    pub entries: Vec<ChatEntry>,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}
