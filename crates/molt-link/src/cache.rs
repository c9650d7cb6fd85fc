//! Cached resource snapshots.
//!
//! The gateway is authoritative; this cache only holds the last-fetched
//! lists so views have something to render between refreshes. Each facet is
//! replaced wholesale — there is no incremental merge — and a facet whose
//! refresh failed simply keeps its previous contents.

use molt_core::{AgentRecord, ChannelHealth, ModelRecord, SessionRecord};
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Last-known gateway resource lists.
#[derive(Clone, Debug, Default)]
pub struct ResourceSnapshot {
    /// Sessions from the latest successful `sessions.list`.
    pub sessions: Vec<SessionRecord>,
    /// Agents from the latest successful `agents.list`.
    pub agents: Vec<AgentRecord>,
    /// Models from the latest successful `models.list`.
    pub models: Vec<ModelRecord>,
    /// Channel health from the latest successful `channels.status`.
    pub channels: Vec<ChannelHealth>,
}

/// Which facets a refresh actually replaced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotUpdate {
    /// `sessions.list` succeeded.
    pub sessions: bool,
    /// `agents.list` succeeded.
    pub agents: bool,
    /// `models.list` succeeded.
    pub models: bool,
    /// `channels.status` succeeded.
    pub channels: bool,
}

impl SnapshotUpdate {
    /// Whether any facet was replaced.
    pub fn any(&self) -> bool {
        self.sessions || self.agents || self.models || self.channels
    }
}

/// Snapshot storage plus the update broadcast.
pub struct ResourceCache {
    snapshot: Mutex<ResourceSnapshot>,
    update_tx: broadcast::Sender<SnapshotUpdate>,
}

impl ResourceCache {
    /// Empty cache.
    pub fn new() -> Self {
        let (update_tx, _) = broadcast::channel(16);
        Self {
            snapshot: Mutex::new(ResourceSnapshot::default()),
            update_tx,
        }
    }

    /// Clone out the current snapshot.
    pub fn snapshot(&self) -> ResourceSnapshot {
        self.snapshot.lock().clone()
    }

    /// Replace the sessions facet.
    pub fn set_sessions(&self, sessions: Vec<SessionRecord>) {
        self.snapshot.lock().sessions = sessions;
    }

    /// Replace the agents facet.
    pub fn set_agents(&self, agents: Vec<AgentRecord>) {
        self.snapshot.lock().agents = agents;
    }

    /// Replace the models facet.
    pub fn set_models(&self, models: Vec<ModelRecord>) {
        self.snapshot.lock().models = models;
    }

    /// Replace the channels facet.
    pub fn set_channels(&self, channels: Vec<ChannelHealth>) {
        self.snapshot.lock().channels = channels;
    }

    /// Subscribe to refresh notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotUpdate> {
        self.update_tx.subscribe()
    }

    /// Announce that a refresh settled.
    ///
    /// Emitted exactly once per refresh, regardless of how many facets
    /// succeeded. A send with no live subscribers is fine.
    pub fn publish(&self, update: SnapshotUpdate) {
        let _ = self.update_tx.send(update);
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
