//! The gateway client facade and its engine loop.
//!
//! One [`GatewayClient`] owns one connection. Inbound frames are dispatched
//! exclusively by shape: the `connect.challenge` event feeds the handshake,
//! responses feed the correlator, every other event feeds the router. All
//! shared state sits behind locks taken only for short critical sections, so
//! the engine loop, callers, and timers interleave freely.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use molt_core::{ChallengePayload, Frame, HelloPayload, RequestFrame};
use molt_settings::MoltSettings;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::cache::{ResourceCache, ResourceSnapshot, SnapshotUpdate};
use crate::correlator::Correlator;
use crate::credentials::{CredentialStore, Credentials};
use crate::errors::LinkError;
use crate::handshake::{self, HandshakePhase};
use crate::reconnect::ReconnectController;
use crate::router::{EventRouter, SubscriptionId};
use crate::transport::{Transport, TransportEvent};

/// Event name the gateway uses to open the handshake.
pub const CHALLENGE_EVENT: &str = "connect.challenge";

/// Method name of the handshake request.
const CONNECT_METHOD: &str = "connect";

/// Externally observable connection state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No socket.
    Disconnected,
    /// Socket opening.
    Connecting,
    /// Socket open, handshake in flight.
    Authenticating,
    /// Handshake accepted; requests flow.
    Connected,
    /// The gateway refused the handshake; the connection is unusable.
    Rejected(String),
}

#[derive(Default)]
struct ConnectionState {
    transport: Option<Transport>,
    phase: HandshakePhase,
    /// Bumped on every successful socket open. Handshake tasks carry the
    /// generation they belong to so a stale task cannot mutate state owned
    /// by a newer connection.
    generation: u64,
}

/// Client handle. Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    settings: MoltSettings,
    store: Box<dyn CredentialStore>,
    credentials: parking_lot::Mutex<Credentials>,
    correlator: Correlator,
    router: EventRouter,
    cache: ResourceCache,
    conn: parking_lot::Mutex<ConnectionState>,
    status_tx: watch::Sender<ConnectionStatus>,
    reconnect: ReconnectController,
    connecting: AtomicBool,
}

impl GatewayClient {
    /// Build a client from settings and a credential store.
    ///
    /// Credentials are loaded once here; every later change is written back
    /// through the store.
    pub fn new(settings: MoltSettings, store: impl CredentialStore + 'static) -> Self {
        let credentials = store.load();
        let reconnect = ReconnectController::new(Duration::from_millis(
            settings.gateway.reconnect_delay_ms,
        ));
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);

        Self {
            inner: Arc::new(ClientInner {
                settings,
                store: Box::new(store),
                credentials: parking_lot::Mutex::new(credentials),
                correlator: Correlator::new(),
                router: EventRouter::new(),
                cache: ResourceCache::new(),
                conn: parking_lot::Mutex::new(ConnectionState::default()),
                status_tx,
                reconnect,
                connecting: AtomicBool::new(false),
            }),
        }
    }

    /// Snapshot of the current credential set.
    pub fn credentials(&self) -> Credentials {
        self.inner.credentials.lock().clone()
    }

    /// Replace and persist the credential set.
    pub fn save_credentials(&self, credentials: Credentials) -> Result<(), LinkError> {
        self.inner.store.store(&credentials)?;
        *self.inner.credentials.lock() = credentials;
        Ok(())
    }

    /// Replace the credential set in memory without touching the store.
    ///
    /// For per-invocation overrides; the next persisted change writes the
    /// whole set back, overrides included.
    pub fn set_credentials(&self, credentials: Credentials) {
        *self.inner.credentials.lock() = credentials;
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.status_tx.borrow().clone()
    }

    /// Watch connection status transitions.
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Open the socket and start the engine.
    ///
    /// Returns once the socket is open; authentication completes
    /// asynchronously — observe it via [`status_watch`](Self::status_watch).
    /// A no-op when a connection already exists or is being opened. Clears
    /// reconnect suppression: explicit connect intent re-arms auto-reconnect.
    pub async fn connect(&self) -> Result<(), LinkError> {
        self.inner.connect().await
    }

    /// Close the connection and suppress the next automatic reconnect.
    pub fn disconnect(&self) {
        self.inner.disconnect();
    }

    /// Issue a request and await its outcome.
    ///
    /// Fails fast with [`LinkError::NotConnected`] while the session is not
    /// authenticated; otherwise resolves exactly once with the response
    /// payload, the gateway's error, or a timeout.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value, LinkError> {
        self.inner.request(method, params).await
    }

    /// Subscribe to a server-pushed event by name.
    pub fn subscribe(&self, event: &str) -> (SubscriptionId, mpsc::UnboundedReceiver<Value>) {
        self.inner.router.subscribe(event)
    }

    /// Remove an event subscription.
    pub fn unsubscribe(&self, event: &str, id: SubscriptionId) -> bool {
        self.inner.router.unsubscribe(event, id)
    }

    /// Clone out the cached resource snapshot.
    pub fn snapshot(&self) -> ResourceSnapshot {
        self.inner.cache.snapshot()
    }

    /// Subscribe to snapshot refresh notifications.
    pub fn subscribe_updates(&self) -> tokio::sync::broadcast::Receiver<SnapshotUpdate> {
        self.inner.cache.subscribe()
    }

    /// Refresh the resource snapshot with a best-effort parallel batch.
    ///
    /// Facets whose sub-request fails keep their previous contents; exactly
    /// one update notification is emitted either way. Never fails.
    pub async fn refresh(&self) -> SnapshotUpdate {
        self.inner.refresh().await
    }

    /// Number of requests currently awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    /// Tear the client down: close the socket, reject in-flight requests,
    /// drop all subscriptions, and suppress reconnection.
    pub fn shutdown(&self) {
        self.inner.disconnect();
        self.inner.correlator.clear();
        self.inner.router.clear();
    }
}

impl ClientInner {
    fn set_status(&self, status: ConnectionStatus) {
        let _ = self.status_tx.send_replace(status);
    }

    fn persist_credentials(&self, credentials: &Credentials) {
        if let Err(e) = self.store.store(credentials) {
            warn!("failed to persist credentials: {e}");
        }
    }

    async fn connect(self: &Arc<Self>) -> Result<(), LinkError> {
        self.reconnect.clear_suppression();

        if self.connecting.swap(true, Ordering::SeqCst) {
            debug!("connection attempt already in progress");
            return Ok(());
        }
        if self.conn.lock().transport.is_some() {
            self.connecting.store(false, Ordering::SeqCst);
            debug!("already connected");
            return Ok(());
        }

        let endpoint = self
            .credentials
            .lock()
            .endpoint
            .clone()
            .unwrap_or_else(|| self.settings.gateway.url.clone());
        self.set_status(ConnectionStatus::Connecting);
        info!(%endpoint, "connecting to gateway");

        let connect_timeout = Duration::from_millis(self.settings.gateway.connect_timeout_ms);
        match Transport::connect(&endpoint, connect_timeout).await {
            Ok((transport, events)) => {
                {
                    let mut conn = self.conn.lock();
                    conn.transport = Some(transport);
                    conn.phase = HandshakePhase::AwaitingChallenge;
                    conn.generation += 1;
                }
                self.connecting.store(false, Ordering::SeqCst);

                let inner = Arc::clone(self);
                drop(tokio::spawn(async move {
                    inner.engine_loop(events).await;
                }));
                Ok(())
            }
            Err(e) => {
                self.connecting.store(false, Ordering::SeqCst);
                self.set_status(ConnectionStatus::Disconnected);
                Err(e)
            }
        }
    }

    fn disconnect(&self) {
        self.reconnect.suppress();
        let transport = {
            let mut conn = self.conn.lock();
            conn.phase = HandshakePhase::Disconnected;
            conn.transport.take()
        };
        if let Some(transport) = transport {
            transport.close();
        }
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// Consume transport events until the socket closes.
    async fn engine_loop(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<TransportEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Frame(raw) => self.dispatch_frame(&raw),
                TransportEvent::Error(e) => warn!("transport error: {e}"),
                TransportEvent::Closed { code, reason } => {
                    self.handle_close(code, &reason);
                    break;
                }
            }
        }
    }

    /// Route one inbound frame to exactly one consumer.
    fn dispatch_frame(self: &Arc<Self>, raw: &str) {
        let frame = match Frame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("malformed frame dropped: {e}");
                return;
            }
        };

        match frame {
            Frame::Event(event) if event.event == CHALLENGE_EVENT => {
                self.on_challenge(event.payload);
            }
            Frame::Event(event) => {
                let delivered = self.router.dispatch(&event.event, &event.payload);
                debug!(event = %event.event, delivered, "event dispatched");
            }
            Frame::Res(response) => {
                let _ = self.correlator.resolve(response);
            }
            Frame::Req(request) => {
                debug!(method = %request.method, "request frame from gateway dropped");
            }
        }
    }

    /// Answer a challenge with exactly one `connect` request.
    fn on_challenge(self: &Arc<Self>, payload: Value) {
        let challenge: ChallengePayload = match serde_json::from_value(payload) {
            Ok(challenge) => challenge,
            Err(e) => {
                debug!("malformed challenge dropped: {e}");
                return;
            }
        };

        let generation = {
            let mut conn = self.conn.lock();
            if conn.phase != HandshakePhase::AwaitingChallenge {
                debug!(phase = ?conn.phase, "duplicate challenge ignored");
                return;
            }
            conn.phase = HandshakePhase::Authenticating;
            conn.generation
        };
        self.set_status(ConnectionStatus::Authenticating);

        let params = {
            let mut credentials = self.credentials.lock();
            let had_device_id = credentials.device_id.is_some();
            let params =
                handshake::build_connect_params(&self.settings, &mut credentials, &challenge.nonce);
            if !had_device_id {
                self.persist_credentials(&credentials);
            }
            params
        };

        let inner = Arc::clone(self);
        drop(tokio::spawn(async move {
            inner.finish_handshake(params, generation).await;
        }));
    }

    async fn finish_handshake(&self, params: molt_core::ConnectParams, generation: u64) {
        let params = match serde_json::to_value(params) {
            Ok(value) => value,
            Err(e) => {
                self.reject_handshake(generation, &e.to_string());
                return;
            }
        };

        match self.raw_request(CONNECT_METHOD, params).await {
            Ok(payload) => {
                let hello: HelloPayload = serde_json::from_value(payload).unwrap_or_default();
                if hello.is_hello_ok() {
                    let rotated = {
                        let mut credentials = self.credentials.lock();
                        let rotated = handshake::apply_hello(&mut credentials, &hello);
                        if rotated {
                            self.persist_credentials(&credentials);
                        }
                        rotated
                    };
                    // The socket can drop between the hello response and this
                    // point; a dead connection must not present as connected.
                    let still_open = {
                        let mut conn = self.conn.lock();
                        if conn.generation == generation && conn.transport.is_some() {
                            conn.phase = HandshakePhase::Authenticated;
                            true
                        } else {
                            false
                        }
                    };
                    if still_open {
                        info!(device_token_rotated = rotated, "gateway handshake complete");
                        self.set_status(ConnectionStatus::Connected);
                    } else {
                        debug!("handshake completed after close, discarded");
                    }
                } else {
                    warn!(kind = %hello.kind, "handshake not acknowledged");
                    self.reject_handshake(
                        generation,
                        &format!("unexpected handshake payload: {}", hello.kind),
                    );
                }
            }
            Err(e) => {
                warn!("handshake failed: {e}");
                self.reject_handshake(generation, &e.to_string());
            }
        }
    }

    /// Surface a handshake failure, unless a newer connection took over.
    fn reject_handshake(&self, generation: u64, reason: &str) {
        let current = {
            let mut conn = self.conn.lock();
            if conn.generation == generation {
                conn.phase = HandshakePhase::Disconnected;
                true
            } else {
                false
            }
        };
        if current {
            self.set_status(ConnectionStatus::Rejected(reason.to_string()));
        } else {
            debug!("stale handshake rejection discarded");
        }
    }

    fn handle_close(self: &Arc<Self>, code: Option<u16>, reason: &str) {
        info!(?code, reason, "gateway connection closed");
        {
            let mut conn = self.conn.lock();
            conn.transport = None;
            conn.phase = HandshakePhase::Disconnected;
        }
        self.set_status(ConnectionStatus::Disconnected);

        if self.credentials.lock().is_configured() {
            let inner = Arc::clone(self);
            let scheduled = self.reconnect.schedule(move || async move {
                if let Err(e) = inner.connect().await {
                    warn!("reconnect attempt failed: {e}");
                }
            });
            if scheduled {
                debug!("reconnect scheduled");
            }
        }
    }

    fn send_frame(&self, frame: &Frame) {
        let json = match frame.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to serialize frame: {e}");
                return;
            }
        };
        match self.conn.lock().transport.as_ref() {
            Some(transport) => transport.send(json),
            None => debug!("frame dropped, no transport"),
        }
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, LinkError> {
        if !self.conn.lock().phase.is_authenticated() {
            return Err(LinkError::NotConnected);
        }
        self.raw_request(method, params).await
    }

    /// Send a request without the authentication guard.
    ///
    /// The handshake's own `connect` request goes through here; everything
    /// else takes [`request`](Self::request).
    async fn raw_request(&self, method: &str, params: Value) -> Result<Value, LinkError> {
        let (id, rx) = self.correlator.register();
        let frame = Frame::Req(RequestFrame::new(id.clone(), method, params));
        debug!(%id, method, "sending request");
        self.send_frame(&frame);

        let timeout = Duration::from_millis(self.settings.gateway.request_timeout_ms);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_closed)) => Err(LinkError::ConnectionClosed),
            Err(_elapsed) => {
                let _ = self.correlator.cancel(&id);
                warn!(%id, method, "request timed out");
                Err(LinkError::Timeout {
                    method: method.to_string(),
                })
            }
        }
    }

    async fn refresh(&self) -> SnapshotUpdate {
        let (sessions, agents, models, channels) = tokio::join!(
            self.request("sessions.list", json!({})),
            self.request("agents.list", json!({})),
            self.request("models.list", json!({})),
            self.request("channels.status", json!({})),
        );

        let mut update = SnapshotUpdate::default();
        if let Some(payload) = decode_facet::<molt_core::SessionsPayload>("sessions.list", sessions)
        {
            self.cache.set_sessions(payload.sessions);
            update.sessions = true;
        }
        if let Some(payload) = decode_facet::<molt_core::AgentsPayload>("agents.list", agents) {
            self.cache.set_agents(payload.agents);
            update.agents = true;
        }
        if let Some(payload) = decode_facet::<molt_core::ModelsPayload>("models.list", models) {
            self.cache.set_models(payload.models);
            update.models = true;
        }
        if let Some(payload) =
            decode_facet::<molt_core::ChannelsPayload>("channels.status", channels)
        {
            self.cache.set_channels(payload.channels);
            update.channels = true;
        }

        self.cache.publish(update);
        update
    }
}

/// Decode one refresh facet, treating any failure as "leave it stale".
fn decode_facet<T: serde::de::DeserializeOwned>(
    method: &str,
    outcome: Result<Value, LinkError>,
) -> Option<T> {
    match outcome {
        Ok(payload) => match serde_json::from_value(payload) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(method, "refresh facet payload malformed: {e}");
                None
            }
        },
        Err(e) => {
            debug!(method, "refresh facet failed: {e}");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;

    fn make_client() -> GatewayClient {
        GatewayClient::new(MoltSettings::default(), MemoryCredentialStore::new())
    }

    #[test]
    fn starts_disconnected() {
        let client = make_client();
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        assert_eq!(client.pending_requests(), 0);
        assert!(client.snapshot().sessions.is_empty());
    }

    #[tokio::test]
    async fn request_before_connect_fails_fast() {
        let client = make_client();
        let result = client.request("sessions.list", json!({})).await;
        assert!(matches!(result, Err(LinkError::NotConnected)));
    }

    #[test]
    fn save_credentials_writes_through_store() {
        let store = MemoryCredentialStore::new();
        let client = GatewayClient::new(MoltSettings::default(), store);

        let credentials = Credentials {
            token: Some("tok-1".into()),
            ..Credentials::default()
        };
        client.save_credentials(credentials.clone()).unwrap();
        assert_eq!(client.credentials(), credentials);
    }

    #[test]
    fn credentials_loaded_at_construction() {
        let seeded = Credentials {
            token: Some("tok-9".into()),
            device_id: Some("dev-9".into()),
            ..Credentials::default()
        };
        let client = GatewayClient::new(
            MoltSettings::default(),
            MemoryCredentialStore::with_credentials(seeded.clone()),
        );
        assert_eq!(client.credentials(), seeded);
    }

    #[test]
    fn subscribe_and_unsubscribe_roundtrip() {
        let client = make_client();
        let (id, _rx) = client.subscribe("agent");
        assert!(client.unsubscribe("agent", id));
        assert!(!client.unsubscribe("agent", id));
    }

    #[test]
    fn shutdown_clears_subscriptions_and_pending() {
        let client = make_client();
        let (_id, mut rx) = client.subscribe("agent");
        client.shutdown();

        assert_eq!(client.status(), ConnectionStatus::Disconnected);
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn connect_to_unreachable_endpoint_errors() {
        let mut settings = MoltSettings::default();
        settings.gateway.url = "ws://127.0.0.1:1".to_string();
        settings.gateway.connect_timeout_ms = 2_000;
        let client = GatewayClient::new(settings, MemoryCredentialStore::new());

        let result = client.connect().await;
        assert!(matches!(result, Err(LinkError::Transport(_))));
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn refresh_without_connection_emits_one_empty_update() {
        let client = make_client();
        let mut updates = client.subscribe_updates();

        let update = client.refresh().await;
        assert!(!update.any());
        assert_eq!(updates.recv().await.unwrap(), update);
        assert!(updates.try_recv().is_err());
    }

    #[test]
    fn status_watch_observes_current_value() {
        let client = make_client();
        let watch = client.status_watch();
        assert_eq!(*watch.borrow(), ConnectionStatus::Disconnected);
    }
}
