//! Generic lifecycle management for duplex provider connections.
//!
//! Both speech providers (transcription and synthesis) speak WebSocket, and
//! both need the same lifecycle: connect on first use, signal when the
//! connection is ready, signal when the session is closing, survive a remote
//! disconnect by reconnecting on the next send, and reject any use after an
//! explicit close. [`ProviderSession`] implements that once; the concrete
//! providers supply a [`SessionConnector`] describing their handshake.
//!
//! Separating "connect" from "receive" lets a caller start listening before
//! the first send, and lets the receive loop survive a mid-session remote
//! disconnect by re-waiting for the next connection instead of terminating
//! the whole session.

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream, Stream, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, watch};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use futures::SinkExt;
use std::sync::Arc;

/// The underlying WebSocket connection type for provider sessions.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Errors produced by provider session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A required credential or setting is missing. Surfaced when the
    /// concrete provider is constructed - a deployment error, not a
    /// transient fault.
    #[error("provider configuration error: {0}")]
    Configuration(String),

    /// The provider handshake failed.
    #[error("provider connection failed: {0}")]
    Connection(String),

    /// The session was used after `close()`. A programming error; never
    /// expected in normal operation.
    #[error("provider session used after close")]
    SessionClosed,

    /// A network write to an established connection failed.
    #[error("provider network error: {0}")]
    Network(String),
}

/// Build a WebSocket upgrade request for a provider endpoint, optionally
/// attaching an `Authorization` header.
pub fn build_ws_request(
    url: &url::Url,
    authorization: Option<String>,
) -> Result<http::Request<()>, SessionError> {
    use tokio_tungstenite::tungstenite::handshake::client::generate_key;

    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => {
            return Err(SessionError::Configuration(format!(
                "endpoint {url} has no host"
            )));
        }
    };

    let mut builder = http::Request::builder()
        .method("GET")
        .uri(url.as_str())
        .header("Host", host)
        .header("Upgrade", "websocket")
        .header("Connection", "upgrade")
        .header("Sec-WebSocket-Key", generate_key())
        .header("Sec-WebSocket-Version", "13");
    if let Some(authorization) = authorization {
        builder = builder.header("Authorization", authorization);
    }
    builder
        .body(())
        .map_err(|e| SessionError::Configuration(format!("invalid handshake request: {e}")))
}

/// Provider-specific handshake description for a [`ProviderSession`].
pub trait SessionConnector: Send + Sync {
    /// The WebSocket upgrade request: endpoint URL with negotiation
    /// parameters (sample rate, encoding, endpointing) plus auth headers.
    fn request(&self) -> Result<http::Request<()>, SessionError>;

    /// Frames to send immediately after the connection is established,
    /// for providers whose protocol opens with a bootstrap message.
    fn initial_frames(&self) -> Vec<Message> {
        Vec::new()
    }

    /// Provider name for logging.
    fn provider_name(&self) -> &'static str;
}

struct SessionShared {
    sink: Mutex<Option<WsSink>>,
    /// Read half of the live connection, parked here by `ensure_connected`
    /// until the receive loop picks it up.
    inbound: Mutex<Option<WsSource>>,
    /// "Connection ready" signal; cleared by the receive loop on pickup.
    ready_tx: watch::Sender<bool>,
    /// "Closing" signal; once set the session is permanently unusable.
    closing: CancellationToken,
}

impl Drop for SessionShared {
    fn drop(&mut self) {
        // A dropped session counts as closed.
        self.closing.cancel();
    }
}

/// One managed duplex connection to an external speech provider.
///
/// State machine: Unconnected -> Connecting -> Open (on first send), with
/// Open -> Unconnected on a remote disconnect or [`reset`](Self::reset), and
/// any state -> Closed on [`close`](Self::close). Closed is terminal: every
/// subsequent operation fails with [`SessionError::SessionClosed`].
///
/// The connection handle is owned exclusively by the session; no other
/// component touches it.
pub struct ProviderSession {
    connector: Box<dyn SessionConnector>,
    shared: Arc<SessionShared>,
}

impl ProviderSession {
    pub fn new(connector: Box<dyn SessionConnector>) -> Self {
        let (ready_tx, _ready_rx) = watch::channel(false);
        Self {
            connector,
            shared: Arc::new(SessionShared {
                sink: Mutex::new(None),
                inbound: Mutex::new(None),
                ready_tx,
                closing: CancellationToken::new(),
            }),
        }
    }

    /// Whether `close()` has been called (or the session dropped elsewhere).
    pub fn is_closed(&self) -> bool {
        self.shared.closing.is_cancelled()
    }

    /// Establish the connection if there is none, performing the provider
    /// handshake at most once per connection. Raises the "connection ready"
    /// signal, waking a receive loop waiting for it.
    pub async fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::SessionClosed);
        }

        let mut sink = self.shared.sink.lock().await;
        // close() may have won the lock between the check above and here;
        // a closed session must never open a fresh connection.
        if self.is_closed() {
            return Err(SessionError::SessionClosed);
        }
        if sink.is_some() {
            return Ok(());
        }

        let request = self.connector.request()?;
        debug!(
            provider = self.connector.provider_name(),
            uri = %request.uri(),
            "connecting provider session"
        );

        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| SessionError::Connection(e.to_string()))?;
        let (mut tx, rx) = ws.split();

        for frame in self.connector.initial_frames() {
            tx.send(frame)
                .await
                .map_err(|e| SessionError::Connection(e.to_string()))?;
        }

        info!(
            provider = self.connector.provider_name(),
            "provider session established"
        );

        *sink = Some(tx);
        *self.shared.inbound.lock().await = Some(rx);
        // send_replace stores the value even when no receive loop is
        // subscribed yet; a later subscriber still observes the ready state.
        self.shared.ready_tx.send_replace(true);
        Ok(())
    }

    /// Write one frame, connecting first if needed. A write failure drops the
    /// dead connection so the next send reconnects.
    pub async fn send(&self, message: Message) -> Result<(), SessionError> {
        self.ensure_connected().await?;

        let mut sink = self.shared.sink.lock().await;
        let Some(tx) = sink.as_mut() else {
            // Closed or reset between ensure_connected and here.
            return Err(SessionError::SessionClosed);
        };
        if let Err(e) = tx.send(message).await {
            *sink = None;
            self.shared.ready_tx.send_replace(false);
            return Err(SessionError::Network(e.to_string()));
        }
        Ok(())
    }

    /// Send a binary frame (audio for transcription providers).
    pub async fn send_binary(&self, data: Bytes) -> Result<(), SessionError> {
        self.send(Message::Binary(data)).await
    }

    /// Send a text frame (JSON control or text payloads).
    pub async fn send_text(&self, text: String) -> Result<(), SessionError> {
        self.send(Message::Text(text.into())).await
    }

    /// Drop the live connection without closing the session. The next send
    /// reconnects; the receive loop goes back to waiting. Used by providers
    /// whose discard operation terminates the current provider-side stream.
    pub async fn reset(&self) {
        if let Some(mut tx) = self.shared.sink.lock().await.take() {
            let _ = tx.close().await;
        }
        self.shared.inbound.lock().await.take();
        self.shared.ready_tx.send_replace(false);
        debug!(
            provider = self.connector.provider_name(),
            "provider session reset"
        );
    }

    /// Close the session. Idempotent; always raises the closing signal.
    /// After this every operation fails with [`SessionError::SessionClosed`].
    pub async fn close(&self) {
        if let Some(mut tx) = self.shared.sink.lock().await.take() {
            let _ = tx.send(Message::Close(None)).await;
            let _ = tx.close().await;
        }
        self.shared.inbound.lock().await.take();
        self.shared.closing.cancel();
        debug!(
            provider = self.connector.provider_name(),
            "provider session closed"
        );
    }

    /// Lazy stream of inbound provider frames.
    ///
    /// Waits on whichever of the closing and connection-ready signals fires
    /// first. On closing the stream terminates; on ready it clears the signal
    /// and iterates the live connection's frames until the remote side closes,
    /// then loops back to waiting. A remote close is therefore not fatal -
    /// the session reconnects on the next send and the same stream resumes.
    ///
    /// One consumer per session: the stream takes ownership of each
    /// connection's read half.
    pub fn receive_messages(&self) -> impl Stream<Item = Message> + Send + 'static {
        let shared = self.shared.clone();
        let provider = self.connector.provider_name();
        async_stream::stream! {
            let mut ready_rx = shared.ready_tx.subscribe();
            'session: loop {
                if shared.closing.is_cancelled() {
                    break;
                }
                if !*ready_rx.borrow_and_update() {
                    tokio::select! {
                        _ = shared.closing.cancelled() => break 'session,
                        changed = ready_rx.changed() => {
                            if changed.is_err() {
                                break 'session;
                            }
                        }
                    }
                    continue;
                }

                // Connection ready: take the read half and clear the signal
                // so a reconnect can raise it again.
                let inbound = shared.inbound.lock().await.take();
                shared.ready_tx.send_replace(false);
                let Some(mut inbound) = inbound else {
                    continue;
                };

                loop {
                    tokio::select! {
                        _ = shared.closing.cancelled() => break 'session,
                        frame = inbound.next() => {
                            match frame {
                                Some(Ok(Message::Close(_))) | None => {
                                    debug!(provider, "provider closed the connection");
                                    break;
                                }
                                Some(Ok(message)) => yield message,
                                Some(Err(e)) => {
                                    warn!(provider, error = %e, "provider socket error");
                                    break;
                                }
                            }
                        }
                    }
                }

                // Remote disconnect: drop the stale write half so the next
                // send performs a fresh handshake.
                shared.sink.lock().await.take();
            }
        }
    }
}
