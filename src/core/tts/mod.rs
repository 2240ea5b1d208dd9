//! Text-to-speech providers.
//!
//! Synthesis is abstracted behind [`TextToSpeech`]: text in, raw audio frames
//! out, plus the three control operations the pipeline needs - speak, flush
//! and discard-unspoken (for barge-in). Shipped providers: Deepgram and
//! ElevenLabs, both streaming over WebSocket.

mod deepgram;
mod elevenlabs;

pub use deepgram::{DEEPGRAM_TTS_URL, DeepgramTts};
pub use elevenlabs::{ELEVENLABS_TTS_URL, ElevenLabsTts};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::core::session::SessionError;

/// One frame of synthesized audio.
#[derive(Debug, Clone, PartialEq)]
pub struct TtsAudio {
    pub data: Bytes,
    /// The provider marked this frame as the last for the current request.
    pub is_final: bool,
}

/// A streaming synthesis session.
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Queue text for synthesis, connecting on first use.
    async fn send_text(&self, text: &str) -> Result<(), SessionError>;

    /// Tell the provider to start voicing queued text without waiting for
    /// more input.
    async fn flush(&self) -> Result<(), SessionError>;

    /// Discard text that is queued but not yet voiced. Audio already in
    /// flight is not guaranteed to stop instantly.
    async fn clear(&self) -> Result<(), SessionError>;

    /// Tear the session down. Idempotent; ends `audio_events`.
    async fn close(&self);

    /// Lazy stream of synthesized audio frames. Single consumer per session.
    fn audio_events(&self) -> BoxStream<'static, TtsAudio>;
}

/// Provider-agnostic synthesis settings.
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub api_key: String,
    /// Provider voice/model identifier; provider default when `None`.
    pub voice_id: Option<String>,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Endpoint override for tests.
    pub endpoint: Option<String>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            voice_id: None,
            sample_rate: 24000,
            endpoint: None,
        }
    }
}

/// Create a synthesis provider by name.
///
/// Supported providers: `"deepgram"`, `"elevenlabs"`.
pub fn create_tts_provider(
    provider: &str,
    config: TtsConfig,
) -> Result<Box<dyn TextToSpeech>, SessionError> {
    match provider.to_lowercase().as_str() {
        "deepgram" => Ok(Box::new(DeepgramTts::new(config)?)),
        "elevenlabs" | "eleven-labs" | "eleven_labs" => Ok(Box::new(ElevenLabsTts::new(config)?)),
        _ => Err(SessionError::Configuration(format!(
            "unsupported TTS provider: {provider}. Supported providers: deepgram, elevenlabs"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key() -> TtsConfig {
        TtsConfig {
            api_key: "test-key".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_tts_provider() {
        assert!(create_tts_provider("deepgram", config_with_key()).is_ok());
        assert!(create_tts_provider("elevenlabs", config_with_key()).is_ok());
        assert!(create_tts_provider("ElevenLabs", config_with_key()).is_ok());
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let result = create_tts_provider("hal9000", config_with_key());
        match result {
            Err(SessionError::Configuration(message)) => {
                assert!(message.contains("deepgram"));
                assert!(message.contains("elevenlabs"));
            }
            Err(other) => panic!("expected configuration error, got {other:?}"),
            Ok(_) => panic!("expected configuration error, got a provider"),
        }
    }

    #[test]
    fn test_missing_key_fails_at_construction() {
        assert!(matches!(
            create_tts_provider("deepgram", TtsConfig::default()),
            Err(SessionError::Configuration(_))
        ));
        assert!(matches!(
            create_tts_provider("elevenlabs", TtsConfig::default()),
            Err(SessionError::Configuration(_))
        ));
    }
}
