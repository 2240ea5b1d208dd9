//! Provider session lifecycle tests against a local WebSocket server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

use voxbridge::core::session::{
    ProviderSession, SessionConnector, SessionError, build_ws_request,
};

struct LocalConnector {
    url: String,
    initial: Vec<Message>,
}

impl LocalConnector {
    fn to(addr: std::net::SocketAddr) -> Self {
        Self {
            url: format!("ws://{addr}"),
            initial: Vec::new(),
        }
    }
}

impl SessionConnector for LocalConnector {
    fn request(&self) -> Result<http::Request<()>, SessionError> {
        let url = Url::parse(&self.url)
            .map_err(|e| SessionError::Configuration(e.to_string()))?;
        build_ws_request(&url, None)
    }

    fn initial_frames(&self) -> Vec<Message> {
        self.initial.clone()
    }

    fn provider_name(&self) -> &'static str {
        "local-test"
    }
}

/// What the local server does with each accepted connection.
#[derive(Clone, Copy)]
enum ServerBehavior {
    /// Read frames until the client closes.
    Sink,
    /// Send two text frames, then read until close.
    Greet,
    /// Close the connection immediately after the handshake.
    CloseImmediately,
}

async fn spawn_server(
    behavior: ServerBehavior,
) -> (
    std::net::SocketAddr,
    Arc<AtomicUsize>,
    mpsc::UnboundedReceiver<Message>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepts = Arc::new(AtomicUsize::new(0));
    let (received_tx, received_rx) = mpsc::unbounded_channel();

    let counter = accepts.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let received_tx = received_tx.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                match behavior {
                    ServerBehavior::CloseImmediately => {
                        let _ = ws.send(Message::Close(None)).await;
                        return;
                    }
                    ServerBehavior::Greet => {
                        let _ = ws.send(Message::Text("one".into())).await;
                        let _ = ws.send(Message::Text("two".into())).await;
                    }
                    ServerBehavior::Sink => {}
                }
                while let Some(Ok(message)) = ws.next().await {
                    if message.is_close() {
                        break;
                    }
                    let _ = received_tx.send(message);
                }
            });
        }
    });

    (addr, accepts, received_rx)
}

#[tokio::test]
async fn test_handshake_happens_at_most_once() {
    let (addr, accepts, mut received) = spawn_server(ServerBehavior::Sink).await;
    let session = ProviderSession::new(Box::new(LocalConnector::to(addr)));

    session.send_text("first".to_string()).await.unwrap();
    session.send_text("second".to_string()).await.unwrap();

    let first = received.recv().await.unwrap();
    let second = received.recv().await.unwrap();
    assert_eq!(first, Message::Text("first".into()));
    assert_eq!(second, Message::Text("second".into()));
    assert_eq!(accepts.load(Ordering::SeqCst), 1);

    session.close().await;
}

#[tokio::test]
async fn test_initial_frames_are_sent_before_payloads() {
    let (addr, _accepts, mut received) = spawn_server(ServerBehavior::Sink).await;
    let session = ProviderSession::new(Box::new(LocalConnector {
        url: format!("ws://{addr}"),
        initial: vec![Message::Text("bootstrap".into())],
    }));

    session.send_text("payload".to_string()).await.unwrap();

    assert_eq!(received.recv().await.unwrap(), Message::Text("bootstrap".into()));
    assert_eq!(received.recv().await.unwrap(), Message::Text("payload".into()));

    session.close().await;
}

#[tokio::test]
async fn test_receive_yields_provider_frames() {
    let (addr, _accepts, _received) = spawn_server(ServerBehavior::Greet).await;
    let session = ProviderSession::new(Box::new(LocalConnector::to(addr)));
    let mut messages = Box::pin(session.receive_messages());

    // The connection opens on the first send; the receive stream then picks
    // up the frames the server greeted with.
    session.send_text("hello".to_string()).await.unwrap();

    assert_eq!(messages.next().await.unwrap(), Message::Text("one".into()));
    assert_eq!(messages.next().await.unwrap(), Message::Text("two".into()));

    session.close().await;
    assert!(messages.next().await.is_none());
}

#[tokio::test]
async fn test_receive_started_after_connect_sees_frames() {
    let (addr, _accepts, _received) = spawn_server(ServerBehavior::Greet).await;
    let session = ProviderSession::new(Box::new(LocalConnector::to(addr)));

    // Connect before anything subscribes to the ready signal.
    session.send_text("hello".to_string()).await.unwrap();

    // A receive stream started afterwards must still observe the already
    // established connection rather than waiting for the next one.
    let mut messages = Box::pin(session.receive_messages());
    assert_eq!(messages.next().await.unwrap(), Message::Text("one".into()));
    assert_eq!(messages.next().await.unwrap(), Message::Text("two".into()));

    session.close().await;
    assert!(messages.next().await.is_none());
}

#[tokio::test]
async fn test_reset_leaves_session_usable() {
    let (addr, accepts, mut received) = spawn_server(ServerBehavior::Sink).await;
    let session = ProviderSession::new(Box::new(LocalConnector::to(addr)));

    session.send_text("before".to_string()).await.unwrap();
    assert_eq!(received.recv().await.unwrap(), Message::Text("before".into()));
    assert_eq!(accepts.load(Ordering::SeqCst), 1);

    session.reset().await;
    assert!(!session.is_closed());

    // The next send performs a fresh handshake.
    session.send_text("after".to_string()).await.unwrap();
    assert_eq!(received.recv().await.unwrap(), Message::Text("after".into()));
    assert_eq!(accepts.load(Ordering::SeqCst), 2);

    // close is terminal where reset is not.
    session.close().await;
    assert_eq!(
        session.send_text("too late".to_string()).await,
        Err(SessionError::SessionClosed)
    );
    assert_eq!(accepts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_close_racing_a_send_never_reconnects() {
    let (addr, accepts, _received) = spawn_server(ServerBehavior::Sink).await;
    let session = ProviderSession::new(Box::new(LocalConnector::to(addr)));

    session.send_text("first".to_string()).await.unwrap();
    assert_eq!(accepts.load(Ordering::SeqCst), 1);

    // Whichever way the race resolves, a closed session must never open a
    // fresh connection.
    let (_, send_result) = tokio::join!(session.close(), session.send_text("late".to_string()));
    assert!(session.is_closed());
    assert_eq!(accepts.load(Ordering::SeqCst), 1);

    if send_result.is_ok() {
        // The send won the race over the existing connection; a follow-up
        // send must still be rejected.
        assert_eq!(
            session.send_text("after close".to_string()).await,
            Err(SessionError::SessionClosed)
        );
    }
}

#[tokio::test]
async fn test_remote_close_then_send_reconnects() {
    let (addr, accepts, _received) = spawn_server(ServerBehavior::CloseImmediately).await;
    let session = ProviderSession::new(Box::new(LocalConnector::to(addr)));

    // Keep the receive loop running so the remote close is observed and the
    // dead connection dropped.
    let messages = Box::pin(session.receive_messages());
    let consumer = tokio::spawn(async move {
        let mut messages = messages;
        while messages.next().await.is_some() {}
    });

    session.send_text("first".to_string()).await.unwrap();
    assert_eq!(accepts.load(Ordering::SeqCst), 1);

    // Give the receive loop time to notice the remote close.
    tokio::time::sleep(Duration::from_millis(100)).await;

    session.send_text("second".to_string()).await.unwrap();
    assert_eq!(accepts.load(Ordering::SeqCst), 2);

    session.close().await;
    consumer.await.unwrap();
}
