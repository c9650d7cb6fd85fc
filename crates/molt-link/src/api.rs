//! Typed wrappers over the gateway method surface.
//!
//! Everything here funnels through [`GatewayClient::request`]; the wrappers
//! only name the method, shape the params, and decode known payloads.
//! Methods whose payloads are gateway-defined and evolving return raw
//! [`Value`]s instead of guessing a schema.

use molt_core::{
    AgentFilePayload, AgentFilesPayload, AgentsPayload, ChannelsPayload, ChatHistoryPayload,
    ModelsPayload, SessionsPayload,
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::client::GatewayClient;
use crate::errors::LinkError;

impl GatewayClient {
    // ── System ──────────────────────────────────────────────────────

    /// Gateway liveness probe.
    pub async fn health(&self) -> Result<Value, LinkError> {
        self.request("health", json!({})).await
    }

    /// Gateway status summary.
    pub async fn status_info(&self) -> Result<Value, LinkError> {
        self.request("status", json!({})).await
    }

    /// Presence of connected clients and channels.
    pub async fn system_presence(&self) -> Result<Value, LinkError> {
        self.request("system-presence", json!({})).await
    }

    /// Recent gateway log lines. Follow-up lines arrive as `log` events.
    pub async fn logs_tail(&self, limit: Option<u64>) -> Result<Value, LinkError> {
        let params = match limit {
            Some(limit) => json!({ "limit": limit }),
            None => json!({}),
        };
        self.request("logs.tail", params).await
    }

    /// Read the gateway configuration.
    pub async fn config_get(&self) -> Result<Value, LinkError> {
        self.request("config.get", json!({})).await
    }

    /// Patch the gateway configuration.
    pub async fn config_patch(&self, patch: Value) -> Result<Value, LinkError> {
        self.request("config.patch", patch).await
    }

    /// List scheduled cron jobs.
    pub async fn cron_list(&self) -> Result<Value, LinkError> {
        self.request("cron.list", json!({})).await
    }

    // ── Sessions ────────────────────────────────────────────────────

    /// List sessions.
    pub async fn sessions_list(&self) -> Result<SessionsPayload, LinkError> {
        let payload = self.request("sessions.list", json!({})).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Preview transcripts for a set of sessions.
    pub async fn sessions_preview(&self, session_keys: &[String]) -> Result<Value, LinkError> {
        self.request("sessions.preview", json!({ "sessionKeys": session_keys }))
            .await
    }

    /// Usage counters for a session.
    pub async fn sessions_usage(&self, session_key: &str) -> Result<Value, LinkError> {
        self.request("sessions.usage", json!({ "sessionKey": session_key }))
            .await
    }

    /// Reset a session's conversation state.
    pub async fn sessions_reset(&self, session_key: &str) -> Result<Value, LinkError> {
        self.request("sessions.reset", json!({ "sessionKey": session_key }))
            .await
    }

    /// Compact a session's context.
    pub async fn sessions_compact(&self, session_key: &str) -> Result<Value, LinkError> {
        self.request("sessions.compact", json!({ "sessionKey": session_key }))
            .await
    }

    /// Delete a session.
    pub async fn sessions_delete(&self, session_key: &str) -> Result<Value, LinkError> {
        self.request("sessions.delete", json!({ "sessionKey": session_key }))
            .await
    }

    // ── Agents ──────────────────────────────────────────────────────

    /// List agents.
    pub async fn agents_list(&self) -> Result<AgentsPayload, LinkError> {
        let payload = self.request("agents.list", json!({})).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Identity card for one agent.
    pub async fn agent_identity_get(&self, agent_id: &str) -> Result<Value, LinkError> {
        self.request("agent.identity.get", json!({ "agentId": agent_id }))
            .await
    }

    /// Create an agent from a definition object.
    pub async fn agents_create(&self, definition: Value) -> Result<Value, LinkError> {
        self.request("agents.create", definition).await
    }

    /// Update an agent.
    pub async fn agents_update(&self, agent_id: &str, patch: Value) -> Result<Value, LinkError> {
        self.request("agents.update", json!({ "agentId": agent_id, "patch": patch }))
            .await
    }

    /// Delete an agent.
    pub async fn agents_delete(&self, agent_id: &str) -> Result<Value, LinkError> {
        self.request("agents.delete", json!({ "agentId": agent_id }))
            .await
    }

    /// List files in an agent's workspace.
    pub async fn agents_files_list(&self, agent_id: &str) -> Result<AgentFilesPayload, LinkError> {
        let payload = self
            .request("agents.files.list", json!({ "agentId": agent_id }))
            .await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Read one file from an agent's workspace.
    pub async fn agents_files_get(
        &self,
        agent_id: &str,
        path: &str,
    ) -> Result<AgentFilePayload, LinkError> {
        let payload = self
            .request("agents.files.get", json!({ "agentId": agent_id, "path": path }))
            .await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Write one file in an agent's workspace.
    pub async fn agents_files_set(
        &self,
        agent_id: &str,
        path: &str,
        content: &str,
    ) -> Result<Value, LinkError> {
        self.request(
            "agents.files.set",
            json!({ "agentId": agent_id, "path": path, "content": content }),
        )
        .await
    }

    // ── Models & channels ───────────────────────────────────────────

    /// List models the gateway can route to.
    pub async fn models_list(&self) -> Result<ModelsPayload, LinkError> {
        let payload = self.request("models.list", json!({})).await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Health of the gateway's channels.
    pub async fn channels_status(&self) -> Result<ChannelsPayload, LinkError> {
        let payload = self.request("channels.status", json!({})).await?;
        Ok(serde_json::from_value(payload)?)
    }

    // ── Chat ────────────────────────────────────────────────────────

    /// Fetch recent transcript entries for a session.
    pub async fn chat_history(
        &self,
        session_key: &str,
        limit: u64,
    ) -> Result<ChatHistoryPayload, LinkError> {
        let payload = self
            .request(
                "chat.history",
                json!({ "sessionKey": session_key, "limit": limit }),
            )
            .await?;
        Ok(serde_json::from_value(payload)?)
    }

    /// Send a chat message.
    ///
    /// Streaming output then arrives as `agent` events; the response only
    /// acknowledges acceptance. Each call carries a fresh idempotency key so
    /// gateway-side retries cannot double-deliver.
    pub async fn chat_send(
        &self,
        session_key: Option<&str>,
        message: &str,
    ) -> Result<Value, LinkError> {
        let mut params = json!({
            "message": message,
            "idempotencyKey": format!("k-{}", Uuid::new_v4()),
        });
        if let Some(session_key) = session_key {
            params["sessionKey"] = json!(session_key);
        }
        self.request("chat.send", params).await
    }

    /// Abort a running chat generation.
    ///
    /// A separate request in its own right — it does not cancel the pending
    /// `chat.send`, whose outcome still arrives (or times out) on its own.
    pub async fn chat_abort(&self, session_key: &str) -> Result<Value, LinkError> {
        self.request("chat.abort", json!({ "sessionKey": session_key }))
            .await
    }
}
