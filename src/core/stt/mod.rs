//! Speech-to-text providers.
//!
//! The pipeline talks to transcription through the [`SpeechToText`] trait so
//! tests can substitute a scripted fake for the real provider. The shipped
//! implementation is [`DeepgramStt`], a streaming WebSocket client.

mod assembler;
mod deepgram;
mod messages;

pub use assembler::TranscriptAssembler;
pub use deepgram::{DEEPGRAM_STT_URL, DeepgramStt, DeepgramSttConfig};
pub use messages::RecognitionEvent;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::core::session::SessionError;

/// A streaming transcription session.
///
/// Accepts raw 16-bit linear PCM mono audio and emits recognition messages
/// distinguishing interim, finalized-fragment and turn-final results.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Forward one buffer of raw audio to the provider, connecting on first
    /// use.
    async fn send_audio(&self, audio: Bytes) -> Result<(), SessionError>;

    /// Tear the session down. Idempotent; ends `recognition_events`.
    async fn close(&self);

    /// Lazy stream of recognition results. Single consumer per session.
    fn recognition_events(&self) -> BoxStream<'static, RecognitionEvent>;
}
