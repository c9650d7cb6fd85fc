//! WebSocket transport.
//!
//! Owns exactly one socket. Two tasks bracket it: a writer draining an
//! outbound channel into the sink, and a reader turning inbound messages
//! into [`TransportEvent`]s. The transport knows nothing about the protocol;
//! all recovery is delegated upward.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};

use crate::errors::LinkError;

/// Lifecycle events emitted by the reader task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text frame arrived.
    Frame(String),
    /// The socket failed mid-flight. Always followed by `Closed`.
    Error(String),
    /// The socket is gone. Emitted exactly once, last.
    Closed {
        /// Close code from the peer, when one was sent.
        code: Option<u16>,
        /// Close reason from the peer, possibly empty.
        reason: String,
    },
}

/// Handle to one open socket.
///
/// `send` writes only while the socket is open; sends attempted after close
/// are silently dropped — no queuing, no error. `close` is idempotent.
pub struct Transport {
    out_tx: mpsc::UnboundedSender<Message>,
    open: Arc<AtomicBool>,
}

impl Transport {
    /// Open a socket to `url` and spawn the reader/writer tasks.
    ///
    /// Returns the transport handle plus the event stream the engine loop
    /// consumes. Frames are delivered strictly in arrival order.
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>), LinkError> {
        let connected = tokio::time::timeout(connect_timeout, connect_async(url))
            .await
            .map_err(|_| LinkError::Transport(format!("timed out connecting to {url}")))?;
        let (stream, _response) = connected.map_err(|e| LinkError::Transport(e.to_string()))?;
        let (mut sink, mut source) = stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<TransportEvent>();
        let open = Arc::new(AtomicBool::new(true));

        // Writer: outbound channel → sink. Ends on sink failure, channel
        // close, or after forwarding a Close frame.
        let _writer = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                let is_close = matches!(message, Message::Close(_));
                if sink.send(message).await.is_err() {
                    debug!("websocket sink closed, writer task ending");
                    break;
                }
                if is_close {
                    break;
                }
            }
        });

        // Reader: socket → events. Emits exactly one Closed, last.
        let reader_open = Arc::clone(&open);
        let _reader = tokio::spawn(async move {
            let mut close_event = None;
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        let _ = event_tx.send(TransportEvent::Frame(text.as_str().to_owned()));
                    }
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => {
                            let _ = event_tx.send(TransportEvent::Frame(text));
                        }
                        Err(_) => debug!("non-utf8 binary frame dropped"),
                    },
                    Ok(Message::Close(frame)) => {
                        close_event = Some(TransportEvent::Closed {
                            code: frame.as_ref().map(|f| u16::from(f.code)),
                            reason: frame.map(|f| f.reason.as_str().to_owned()).unwrap_or_default(),
                        });
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("websocket read error: {e}");
                        let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
            reader_open.store(false, Ordering::SeqCst);
            let _ = event_tx.send(close_event.unwrap_or(TransportEvent::Closed {
                code: None,
                reason: String::new(),
            }));
        });

        Ok((Self { out_tx, open }, event_rx))
    }

    /// Whether the socket is still open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Send a text frame.
    ///
    /// Dropped silently when the socket is not open.
    pub fn send(&self, text: String) {
        if !self.is_open() {
            debug!("dropping frame, transport not open");
            return;
        }
        if self.out_tx.send(Message::Text(text.into())).is_err() {
            debug!("dropping frame, writer task gone");
            self.open.store(false, Ordering::SeqCst);
        }
    }

    /// Begin the close handshake. Idempotent.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            let _ = self.out_tx.send(Message::Close(None));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
