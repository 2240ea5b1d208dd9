//! Voice WebSocket handler.
//!
//! The client streams raw PCM audio as binary frames; the server streams
//! pipeline events back as JSON text frames. A fatal pipeline error becomes a
//! final `error` frame followed by a close, never a silently stuck socket.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};

use crate::core::events::{WireEvent, epoch_millis};
use crate::state::AppState;

/// Inbound audio frames buffered between the socket and the pipeline.
const AUDIO_CHANNEL_CAPACITY: usize = 1024;

pub async fn voice_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_voice_socket(socket, state))
}

async fn handle_voice_socket(mut socket: WebSocket, state: AppState) {
    info!("voice connection opened");

    let pipeline = match state.build_pipeline() {
        Ok(pipeline) => pipeline,
        Err(e) => {
            warn!(error = %e, "rejecting connection, pipeline construction failed");
            let _ = socket.send(error_frame(&e.to_string())).await;
            return;
        }
    };

    let (mut outbound, mut inbound) = socket.split();

    // Reading and writing run independently so a slow client cannot stall
    // audio intake. The reader forwards binary frames into a bounded channel
    // that backs the pipeline's audio source.
    let (audio_tx, mut audio_rx) = mpsc::channel::<Bytes>(AUDIO_CHANNEL_CAPACITY);
    let reader = AbortOnDropHandle::new(tokio::spawn(async move {
        while let Some(Ok(message)) = inbound.next().await {
            match message {
                Message::Binary(data) => {
                    if audio_tx.send(data).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                other => debug!(kind = ?other, "ignoring non-audio client frame"),
            }
        }
        // Dropping the sender ends the pipeline's audio source.
    }));

    let audio = async_stream::stream! {
        while let Some(frame) = audio_rx.recv().await {
            yield frame;
        }
    }
    .boxed();

    let mut events = pipeline.run(audio);
    while let Some(result) = events.next().await {
        match result {
            Ok(event) => {
                let payload = match serde_json::to_string(&WireEvent::new(&event)) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, kind = event.kind(), "failed to serialize event");
                        continue;
                    }
                };
                if outbound.send(Message::Text(payload.into())).await.is_err() {
                    debug!("client went away mid-stream");
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "pipeline failed, closing connection");
                let _ = outbound.send(error_frame(&e.to_string())).await;
                break;
            }
        }
    }

    drop(reader);
    let _ = outbound.close().await;
    info!("voice connection closed");
}

fn error_frame(message: &str) -> Message {
    let frame = serde_json::json!({
        "type": "error",
        "message": message,
        "timestamp": epoch_millis(),
    });
    Message::Text(frame.to_string().into())
}
