//! End-to-end engine tests against a scripted in-process gateway.
//!
//! Each test spins up a real WebSocket server whose behavior is scripted to
//! the scenario: push a challenge, answer (or withhold) responses, close the
//! socket. The client under test runs the full stack — transport, handshake,
//! correlator, router, cache, reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use molt_link::{
    ConnectionStatus, CredentialStore, Credentials, GatewayClient, LinkError,
    MemoryCredentialStore,
};
use molt_settings::MoltSettings;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

type Ws = WebSocketStream<TcpStream>;

// ── Scripted gateway helpers ────────────────────────────────────────────────

async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("gateway send");
}

async fn recv_json(ws: &mut Ws) -> Option<Value> {
    while let Some(message) = ws.next().await {
        match message {
            Ok(Message::Text(text)) => {
                return Some(serde_json::from_str(text.as_str()).expect("client sent json"));
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

async fn push_challenge(ws: &mut Ws, nonce: &str) {
    send_json(
        ws,
        json!({"type": "event", "event": "connect.challenge", "payload": {"nonce": nonce}}),
    )
    .await;
}

/// Push a challenge, accept the `connect` request, answer `hello-ok`.
///
/// Returns the connect params the client sent.
async fn complete_handshake(ws: &mut Ws, device_token: Option<&str>) -> Value {
    push_challenge(ws, "nonce-1").await;
    let request = recv_json(ws).await.expect("connect request");
    assert_eq!(request["type"], "req");
    assert_eq!(request["method"], "connect");

    let mut payload = json!({"type": "hello-ok"});
    if let Some(token) = device_token {
        payload["deviceToken"] = json!(token);
    }
    send_json(
        ws,
        json!({"type": "res", "id": request["id"], "ok": true, "payload": payload}),
    )
    .await;
    request["params"].clone()
}

/// One-connection gateway with a scripted handler.
async fn spawn_gateway<F, Fut>(handler: F) -> String
where
    F: FnOnce(Ws) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let ws = accept_async(socket).await.unwrap();
        handler(ws).await;
    });
    format!("ws://{addr}")
}

/// Multi-connection gateway; the handler also receives the connection index.
async fn spawn_gateway_loop<F, Fut>(handler: F) -> (String, Arc<AtomicUsize>)
where
    F: Fn(Ws, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&connections);
    let _server = tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let index = counter.fetch_add(1, Ordering::SeqCst);
            let ws = accept_async(socket).await.unwrap();
            handler(ws, index).await;
        }
    });
    (format!("ws://{addr}"), connections)
}

// ── Client helpers ──────────────────────────────────────────────────────────

fn make_settings(url: &str) -> MoltSettings {
    let mut settings = MoltSettings::default();
    settings.gateway.url = url.to_string();
    settings
}

fn seeded_store() -> Arc<MemoryCredentialStore> {
    Arc::new(MemoryCredentialStore::with_credentials(Credentials {
        token: Some("tok-test".into()),
        device_id: Some("dev-test".into()),
        ..Credentials::default()
    }))
}

async fn wait_for_status<F>(client: &GatewayClient, mut predicate: F)
where
    F: FnMut(&ConnectionStatus) -> bool,
{
    let mut watch = client.status_watch();
    tokio::time::timeout(Duration::from_secs(5), watch.wait_for(|s| predicate(s)))
        .await
        .expect("status wait timed out")
        .expect("status channel closed");
}

// ── Handshake ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn handshake_completes_and_embeds_credentials() {
    let (params_tx, params_rx) = tokio::sync::oneshot::channel();
    let url = spawn_gateway(|mut ws| async move {
        let params = complete_handshake(&mut ws, None).await;
        let _ = params_tx.send(params);
        // Keep the socket open until the test ends.
        let _ = recv_json(&mut ws).await;
    })
    .await;

    let client = GatewayClient::new(make_settings(&url), seeded_store());
    client.connect().await.unwrap();
    wait_for_status(&client, |s| *s == ConnectionStatus::Connected).await;

    let params = params_rx.await.unwrap();
    assert_eq!(params["auth"]["token"], "tok-test");
    assert_eq!(params["device"]["id"], "dev-test");
    assert_eq!(params["device"]["nonce"], "nonce-1");
    assert_eq!(params["minProtocol"], 3);
    assert_eq!(params["role"], "operator");
    assert_eq!(
        params["scopes"],
        json!(["operator.read", "operator.write", "operator.admin"])
    );
    client.shutdown();
}

#[tokio::test]
async fn exactly_one_connect_per_challenge_instance() {
    let connects = Arc::new(AtomicUsize::new(0));
    let connects_seen = Arc::clone(&connects);
    let url = spawn_gateway(move |mut ws| async move {
        // Two challenges before the client can possibly authenticate.
        push_challenge(&mut ws, "n-1").await;
        push_challenge(&mut ws, "n-2").await;

        while let Some(request) = recv_json(&mut ws).await {
            if request["method"] == "connect" {
                let _ = connects_seen.fetch_add(1, Ordering::SeqCst);
                send_json(
                    &mut ws,
                    json!({"type": "res", "id": request["id"], "ok": true,
                           "payload": {"type": "hello-ok"}}),
                )
                .await;
            } else {
                send_json(
                    &mut ws,
                    json!({"type": "res", "id": request["id"], "ok": true, "payload": {}}),
                )
                .await;
            }
        }
    })
    .await;

    let client = GatewayClient::new(make_settings(&url), seeded_store());
    client.connect().await.unwrap();
    wait_for_status(&client, |s| *s == ConnectionStatus::Connected).await;

    // A round-trip after authentication guarantees both challenges were
    // processed before we count.
    let _ = client.health().await.unwrap();
    assert_eq!(connects.load(Ordering::SeqCst), 1);
    client.shutdown();
}

#[tokio::test]
async fn rotated_device_token_is_persisted_and_reused() {
    let (reused_tx, mut reused_rx) = tokio::sync::mpsc::unbounded_channel::<Value>();
    let (url, _connections) = spawn_gateway_loop(move |mut ws, index| {
        let reused_tx = reused_tx.clone();
        async move {
            if index == 0 {
                let params = complete_handshake(&mut ws, Some("dt-rotated")).await;
                assert!(params["auth"].get("deviceToken").is_none());
                // Let the handshake settle, then drop the connection so the
                // client reconnects on its own.
                tokio::time::sleep(Duration::from_millis(100)).await;
                let _ = ws.close(None).await;
            } else {
                push_challenge(&mut ws, "nonce-2").await;
                let request = recv_json(&mut ws).await.expect("second connect");
                let _ = reused_tx.send(request["params"]["auth"]["deviceToken"].clone());
                send_json(
                    &mut ws,
                    json!({"type": "res", "id": request["id"], "ok": true,
                           "payload": {"type": "hello-ok"}}),
                )
                .await;
                let _ = recv_json(&mut ws).await;
            }
        }
    })
    .await;

    let store = seeded_store();
    let mut settings = make_settings(&url);
    settings.gateway.reconnect_delay_ms = 200;
    let client = GatewayClient::new(settings, Arc::clone(&store));
    client.connect().await.unwrap();
    wait_for_status(&client, |s| *s == ConnectionStatus::Connected).await;

    // Rotation persisted through the store.
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.load().device_token.as_deref() != Some("dt-rotated") {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("device token never persisted");

    // The automatic reconnect performs a second handshake; the stored token
    // must come back verbatim.
    let reused = tokio::time::timeout(Duration::from_secs(5), reused_rx.recv())
        .await
        .expect("no second handshake")
        .expect("channel closed");
    assert_eq!(reused, json!("dt-rotated"));
    client.shutdown();
}

#[tokio::test]
async fn handshake_rejection_is_distinguished() {
    let url = spawn_gateway(|mut ws| async move {
        push_challenge(&mut ws, "n").await;
        let request = recv_json(&mut ws).await.expect("connect request");
        send_json(
            &mut ws,
            json!({"type": "res", "id": request["id"], "ok": false,
                   "error": {"code": "NOT_AUTHORIZED", "message": "bad token"}}),
        )
        .await;
        let _ = recv_json(&mut ws).await;
    })
    .await;

    let client = GatewayClient::new(make_settings(&url), seeded_store());
    client.connect().await.unwrap();
    wait_for_status(&client, |s| matches!(s, ConnectionStatus::Rejected(_))).await;

    let ConnectionStatus::Rejected(reason) = client.status() else {
        panic!("expected rejected status");
    };
    assert!(reason.contains("NOT_AUTHORIZED"));

    // The connection is not usable for requests.
    let result = client.request("health", json!({})).await;
    assert!(matches!(result, Err(LinkError::NotConnected)));
    client.shutdown();
}

#[tokio::test]
async fn requests_fail_fast_before_authentication() {
    // Gateway that never sends a challenge.
    let url = spawn_gateway(|mut ws| async move {
        let _ = recv_json(&mut ws).await;
    })
    .await;

    let client = GatewayClient::new(make_settings(&url), seeded_store());
    client.connect().await.unwrap();

    let result = client.request("sessions.list", json!({})).await;
    assert!(matches!(result, Err(LinkError::NotConnected)));
    client.shutdown();
}

// ── Request correlation ─────────────────────────────────────────────────────

#[tokio::test]
async fn sessions_list_resolves_with_payload() {
    let url = spawn_gateway(|mut ws| async move {
        let _ = complete_handshake(&mut ws, None).await;
        let request = recv_json(&mut ws).await.expect("sessions.list");
        assert_eq!(request["method"], "sessions.list");
        send_json(
            &mut ws,
            json!({"type": "res", "id": request["id"], "ok": true,
                   "payload": {"sessions": [{"sessionKey": "s-1"}]}}),
        )
        .await;
        let _ = recv_json(&mut ws).await;
    })
    .await;

    let client = GatewayClient::new(make_settings(&url), seeded_store());
    client.connect().await.unwrap();
    wait_for_status(&client, |s| *s == ConnectionStatus::Connected).await;

    let payload = client.sessions_list().await.unwrap();
    assert_eq!(payload.sessions.len(), 1);
    assert_eq!(payload.sessions[0].session_key.as_deref(), Some("s-1"));
    client.shutdown();
}

#[tokio::test]
async fn concurrent_requests_resolve_independently() {
    let url = spawn_gateway(|mut ws| async move {
        let _ = complete_handshake(&mut ws, None).await;

        // Collect both requests first, then answer in reverse order.
        let first = recv_json(&mut ws).await.expect("first request");
        let second = recv_json(&mut ws).await.expect("second request");
        send_json(
            &mut ws,
            json!({"type": "res", "id": second["id"], "ok": true,
                   "payload": {"answer": second["method"]}}),
        )
        .await;
        send_json(
            &mut ws,
            json!({"type": "res", "id": first["id"], "ok": true,
                   "payload": {"answer": first["method"]}}),
        )
        .await;
        let _ = recv_json(&mut ws).await;
    })
    .await;

    let client = GatewayClient::new(make_settings(&url), seeded_store());
    client.connect().await.unwrap();
    wait_for_status(&client, |s| *s == ConnectionStatus::Connected).await;

    let (status, health) = tokio::join!(
        client.request("status", json!({})),
        client.request("health", json!({})),
    );
    // Completion order inverted on the wire; each caller still gets its own.
    assert_eq!(status.unwrap()["answer"], "status");
    assert_eq!(health.unwrap()["answer"], "health");
    client.shutdown();
}

#[tokio::test]
async fn unknown_response_id_is_ignored() {
    let url = spawn_gateway(|mut ws| async move {
        let _ = complete_handshake(&mut ws, None).await;
        let request = recv_json(&mut ws).await.expect("request");
        // A stray response nobody asked for, then the real one.
        send_json(
            &mut ws,
            json!({"type": "res", "id": "999", "ok": true, "payload": {"stray": true}}),
        )
        .await;
        send_json(
            &mut ws,
            json!({"type": "res", "id": request["id"], "ok": true, "payload": {"real": true}}),
        )
        .await;
        let _ = recv_json(&mut ws).await;
    })
    .await;

    let client = GatewayClient::new(make_settings(&url), seeded_store());
    client.connect().await.unwrap();
    wait_for_status(&client, |s| *s == ConnectionStatus::Connected).await;

    let payload = client.request("health", json!({})).await.unwrap();
    assert_eq!(payload["real"], true);
    assert_eq!(client.pending_requests(), 0);
    client.shutdown();
}

#[tokio::test]
async fn timeout_then_late_response_is_dropped() {
    let (late_tx, late_rx) = tokio::sync::oneshot::channel::<()>();
    let url = spawn_gateway(|mut ws| async move {
        let _ = complete_handshake(&mut ws, None).await;
        let starved = recv_json(&mut ws).await.expect("request to starve");

        // Wait until the client has timed out, then answer anyway.
        let _ = late_rx.await;
        send_json(
            &mut ws,
            json!({"type": "res", "id": starved["id"], "ok": true, "payload": {"late": true}}),
        )
        .await;

        // Prove the engine still works after the stray frame.
        let next = recv_json(&mut ws).await.expect("follow-up request");
        send_json(
            &mut ws,
            json!({"type": "res", "id": next["id"], "ok": true, "payload": {"fresh": true}}),
        )
        .await;
        let _ = recv_json(&mut ws).await;
    })
    .await;

    let mut settings = make_settings(&url);
    settings.gateway.request_timeout_ms = 300;
    let client = GatewayClient::new(settings, seeded_store());
    client.connect().await.unwrap();
    wait_for_status(&client, |s| *s == ConnectionStatus::Connected).await;

    let starved = client.request("sessions.usage", json!({})).await;
    assert!(matches!(starved, Err(ref e) if e.is_timeout()));
    assert_eq!(client.pending_requests(), 0);

    let _ = late_tx.send(());
    let fresh = client.request("health", json!({})).await.unwrap();
    assert_eq!(fresh["fresh"], true);
    client.shutdown();
}

#[tokio::test]
async fn gateway_error_passes_through() {
    let url = spawn_gateway(|mut ws| async move {
        let _ = complete_handshake(&mut ws, None).await;
        let request = recv_json(&mut ws).await.expect("request");
        send_json(
            &mut ws,
            json!({"type": "res", "id": request["id"], "ok": false,
                   "error": {"code": "SESSION_NOT_FOUND", "message": "no such session",
                             "sessionKey": "s-9"}}),
        )
        .await;
        let _ = recv_json(&mut ws).await;
    })
    .await;

    let client = GatewayClient::new(make_settings(&url), seeded_store());
    client.connect().await.unwrap();
    wait_for_status(&client, |s| *s == ConnectionStatus::Connected).await;

    let result = client.sessions_delete("s-9").await;
    match result {
        Err(LinkError::Gateway(detail)) => {
            assert_eq!(detail.code.as_deref(), Some("SESSION_NOT_FOUND"));
            assert_eq!(detail.message, "no such session");
            assert_eq!(detail.extra["sessionKey"], "s-9");
        }
        other => panic!("expected gateway error, got {other:?}"),
    }
    client.shutdown();
}

// ── Event routing ───────────────────────────────────────────────────────────

#[tokio::test]
async fn events_fan_out_to_all_subscribers() {
    let url = spawn_gateway(|mut ws| async move {
        let _ = complete_handshake(&mut ws, None).await;
        send_json(
            &mut ws,
            json!({"type": "event", "event": "agent", "payload": {"delta": "hi"}}),
        )
        .await;
        let _ = recv_json(&mut ws).await;
    })
    .await;

    let client = GatewayClient::new(make_settings(&url), seeded_store());
    let (_first, mut rx_first) = client.subscribe("agent");
    let (_second, mut rx_second) = client.subscribe("agent");
    client.connect().await.unwrap();
    wait_for_status(&client, |s| *s == ConnectionStatus::Connected).await;

    let payload_first = tokio::time::timeout(Duration::from_secs(5), rx_first.recv())
        .await
        .unwrap()
        .unwrap();
    let payload_second = tokio::time::timeout(Duration::from_secs(5), rx_second.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payload_first["delta"], "hi");
    assert_eq!(payload_second["delta"], "hi");
    // Exactly once each.
    assert!(rx_first.try_recv().is_err());
    assert!(rx_second.try_recv().is_err());
    client.shutdown();
}

#[tokio::test]
async fn malformed_frames_are_dropped_without_crashing() {
    let url = spawn_gateway(|mut ws| async move {
        let _ = complete_handshake(&mut ws, None).await;
        // Garbage, a frame with an unknown tag, and a truncated object.
        ws.send(Message::Text("not json".into())).await.unwrap();
        ws.send(Message::Text(r#"{"type":"mystery"}"#.into()))
            .await
            .unwrap();
        ws.send(Message::Text(r#"{"type":"res""#.into()))
            .await
            .unwrap();

        let request = recv_json(&mut ws).await.expect("request after garbage");
        send_json(
            &mut ws,
            json!({"type": "res", "id": request["id"], "ok": true, "payload": {"alive": true}}),
        )
        .await;
        let _ = recv_json(&mut ws).await;
    })
    .await;

    let client = GatewayClient::new(make_settings(&url), seeded_store());
    client.connect().await.unwrap();
    wait_for_status(&client, |s| *s == ConnectionStatus::Connected).await;

    let payload = client.health().await.unwrap();
    assert_eq!(payload["alive"], true);
    client.shutdown();
}

// ── Resource cache ──────────────────────────────────────────────────────────

/// Gateway whose second refresh fails the models/channels facets.
async fn spawn_refresh_gateway() -> String {
    spawn_gateway(|mut ws| async move {
        let _ = complete_handshake(&mut ws, None).await;
        let mut round = 0usize;
        let mut served = 0usize;
        while let Some(request) = recv_json(&mut ws).await {
            let method = request["method"].as_str().unwrap_or_default().to_string();
            let id = request["id"].clone();
            let fail = round > 0 && (method == "models.list" || method == "channels.status");
            let response = if fail {
                json!({"type": "res", "id": id, "ok": false,
                       "error": {"code": "NOT_AVAILABLE", "message": "backend down"}})
            } else {
                let payload = match method.as_str() {
                    "sessions.list" => json!({"sessions": [{"sessionKey": format!("s-{round}")}]}),
                    "agents.list" => json!({"agents": [{"id": format!("a-{round}")}]}),
                    "models.list" => json!({"models": [{"id": format!("m-{round}")}]}),
                    "channels.status" => json!({"channels": [{"id": format!("c-{round}")}]}),
                    _ => json!({}),
                };
                json!({"type": "res", "id": id, "ok": true, "payload": payload})
            };
            send_json(&mut ws, response).await;
            served += 1;
            if served % 4 == 0 {
                round += 1;
            }
        }
    })
    .await
}

#[tokio::test]
async fn refresh_tolerates_partial_failure() {
    let url = spawn_refresh_gateway().await;
    let client = GatewayClient::new(make_settings(&url), seeded_store());
    let mut updates = client.subscribe_updates();
    client.connect().await.unwrap();
    wait_for_status(&client, |s| *s == ConnectionStatus::Connected).await;

    // Round 0: every facet succeeds.
    let first = client.refresh().await;
    assert!(first.sessions && first.agents && first.models && first.channels);
    let snapshot = client.snapshot();
    assert_eq!(snapshot.sessions[0].session_key.as_deref(), Some("s-0"));
    assert_eq!(snapshot.models[0].id, "m-0");

    // Round 1: models and channels fail; the other two advance.
    let second = client.refresh().await;
    assert!(second.sessions && second.agents);
    assert!(!second.models && !second.channels);

    let snapshot = client.snapshot();
    assert_eq!(snapshot.sessions[0].session_key.as_deref(), Some("s-1"));
    assert_eq!(snapshot.agents[0].id, "a-1");
    // Stale facets keep their round-0 contents.
    assert_eq!(snapshot.models[0].id, "m-0");
    assert_eq!(snapshot.channels[0].id, "c-0");

    // Exactly one notification per refresh.
    assert_eq!(updates.recv().await.unwrap(), first);
    assert_eq!(updates.recv().await.unwrap(), second);
    assert!(updates.try_recv().is_err());
    client.shutdown();
}

// ── Reconnection ────────────────────────────────────────────────────────────

#[tokio::test]
async fn close_schedules_one_reconnect_after_fixed_delay() {
    let (url, connections) = spawn_gateway_loop(|mut ws, index| async move {
        let _ = complete_handshake(&mut ws, None).await;
        if index == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = ws.close(None).await;
        } else {
            let _ = recv_json(&mut ws).await;
        }
    })
    .await;

    let mut settings = make_settings(&url);
    settings.gateway.reconnect_delay_ms = 200;
    let client = GatewayClient::new(settings, seeded_store());
    client.connect().await.unwrap();
    wait_for_status(&client, |s| *s == ConnectionStatus::Connected).await;

    // Server drops the connection; the client comes back on its own.
    wait_for_status(&client, |s| *s == ConnectionStatus::Disconnected).await;
    wait_for_status(&client, |s| *s == ConnectionStatus::Connected).await;
    assert_eq!(connections.load(Ordering::SeqCst), 2);

    // And only once: no runaway reconnects.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(connections.load(Ordering::SeqCst), 2);
    client.shutdown();
}

#[tokio::test]
async fn disconnect_suppresses_scheduled_reconnect() {
    let (url, connections) = spawn_gateway_loop(|mut ws, _index| async move {
        let _ = complete_handshake(&mut ws, None).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = ws.close(None).await;
    })
    .await;

    let mut settings = make_settings(&url);
    settings.gateway.reconnect_delay_ms = 200;
    let client = GatewayClient::new(settings, seeded_store());
    client.connect().await.unwrap();
    wait_for_status(&client, |s| *s == ConnectionStatus::Connected).await;
    wait_for_status(&client, |s| *s == ConnectionStatus::Disconnected).await;

    // Manual disconnect right after the close: the pending attempt must die.
    client.disconnect();
    tokio::time::sleep(Duration::from_millis(700)).await;
    assert_eq!(connections.load(Ordering::SeqCst), 1);
    client.shutdown();
}

#[tokio::test]
async fn no_reconnect_without_configured_credentials() {
    let (url, connections) = spawn_gateway_loop(|mut ws, _index| async move {
        let _ = complete_handshake(&mut ws, None).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = ws.close(None).await;
    })
    .await;

    let mut settings = make_settings(&url);
    settings.gateway.reconnect_delay_ms = 100;
    // No token in the store.
    let client = GatewayClient::new(settings, Arc::new(MemoryCredentialStore::new()));
    client.connect().await.unwrap();
    wait_for_status(&client, |s| *s == ConnectionStatus::Connected).await;
    wait_for_status(&client, |s| *s == ConnectionStatus::Disconnected).await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(connections.load(Ordering::SeqCst), 1);
    client.shutdown();
}
