//! Recognition stage: raw audio in, `stt_chunk`/`stt_output` events out.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, warn};

use crate::core::merge::EventStream;
use crate::core::session::SessionError;
use crate::core::stt::{SpeechToText, TranscriptAssembler};

/// How long to keep the provider session open after the last audio frame, so
/// trailing recognition results can still arrive.
const TRAILING_EVENT_GRACE: Duration = Duration::from_millis(200);

/// Feed `audio` to the recognition provider while assembling its results
/// into pipeline events.
///
/// Audio forwarding runs as a separate task so a burst of inbound audio never
/// waits on event consumption. When the audio source ends (or a send fails)
/// the task closes the provider session after a short grace period, which
/// ends the recognition stream and thereby this stage.
pub(crate) fn run(stt: Arc<dyn SpeechToText>, audio: BoxStream<'static, Bytes>) -> EventStream {
    async_stream::stream! {
        let recognition = stt.recognition_events();

        let pump = {
            let stt = stt.clone();
            AbortOnDropHandle::new(tokio::spawn(async move {
                let mut audio = pin!(audio);
                let mut result = Ok(());
                while let Some(frame) = audio.next().await {
                    if let Err(e) = stt.send_audio(frame).await {
                        if e != SessionError::SessionClosed {
                            result = Err(e);
                        }
                        break;
                    }
                }
                tokio::time::sleep(TRAILING_EVENT_GRACE).await;
                stt.close().await;
                result
            }))
        };

        let mut assembler = TranscriptAssembler::new();
        let mut recognition = pin!(recognition);
        while let Some(result) = recognition.next().await {
            if let Some(event) = assembler.push(result) {
                debug!(kind = event.kind(), "recognition event");
                yield Ok(event);
            }
        }

        match pump.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => yield Err(e.into()),
            Err(e) => warn!(error = %e, "audio pump task failed"),
        }
    }
    .boxed()
}
