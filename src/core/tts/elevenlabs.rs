//! ElevenLabs streaming TTS client.
//!
//! Speaks the stream-input protocol: after the connection opens, a bootstrap
//! frame carries the voice settings and API key; subsequent frames carry
//! text. Audio comes back as JSON frames with a base64 `audio` field (or raw
//! binary, which some output formats use). The protocol has no discard
//! control frame, so `clear` is realized as an end-of-stream frame followed
//! by a session reset - the next send reconnects with a fresh provider-side
//! buffer.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::warn;
use url::Url;

use crate::core::session::{ProviderSession, SessionConnector, SessionError, build_ws_request};
use crate::core::tts::{TextToSpeech, TtsAudio, TtsConfig};

/// ElevenLabs stream-input endpoint; `{voice_id}` is substituted in.
pub const ELEVENLABS_TTS_URL: &str =
    "wss://api.elevenlabs.io/v1/text-to-speech/{voice_id}/stream-input";

const DEFAULT_VOICE_ID: &str = "JBFqnCBsd6RMkjVDRZzb";
const DEFAULT_MODEL_ID: &str = "eleven_multilingual_v2";
const DEFAULT_STABILITY: f32 = 0.5;
const DEFAULT_SIMILARITY_BOOST: f32 = 0.75;

struct ElevenLabsConnector {
    config: TtsConfig,
}

impl SessionConnector for ElevenLabsConnector {
    fn request(&self) -> Result<http::Request<()>, SessionError> {
        let voice_id = self.config.voice_id.as_deref().unwrap_or(DEFAULT_VOICE_ID);
        let endpoint = match &self.config.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => ELEVENLABS_TTS_URL.replace("{voice_id}", voice_id),
        };
        let mut url = Url::parse(&endpoint)
            .map_err(|e| SessionError::Configuration(format!("invalid endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("model_id", DEFAULT_MODEL_ID)
            .append_pair(
                "output_format",
                &format!("pcm_{}", self.config.sample_rate),
            );

        // Auth travels in the bootstrap frame, not a header.
        build_ws_request(&url, None)
    }

    fn initial_frames(&self) -> Vec<Message> {
        let bootstrap = serde_json::json!({
            "text": " ",
            "voice_settings": {
                "stability": DEFAULT_STABILITY,
                "similarity_boost": DEFAULT_SIMILARITY_BOOST,
            },
            "xi_api_key": self.config.api_key,
        });
        vec![Message::Text(bootstrap.to_string().into())]
    }

    fn provider_name(&self) -> &'static str {
        "elevenlabs-tts"
    }
}

/// ElevenLabs streaming TTS session.
pub struct ElevenLabsTts {
    session: ProviderSession,
}

impl ElevenLabsTts {
    pub fn new(config: TtsConfig) -> Result<Self, SessionError> {
        if config.api_key.is_empty() {
            return Err(SessionError::Configuration(
                "ElevenLabs API key is not set".to_string(),
            ));
        }
        Ok(Self {
            session: ProviderSession::new(Box::new(ElevenLabsConnector { config })),
        })
    }
}

#[derive(Deserialize)]
struct StreamInputFrame {
    #[serde(default)]
    audio: Option<String>,
    #[serde(rename = "isFinal", default)]
    is_final: Option<bool>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[async_trait]
impl TextToSpeech for ElevenLabsTts {
    async fn send_text(&self, text: &str) -> Result<(), SessionError> {
        let frame = serde_json::json!({ "text": text });
        self.session.send_text(frame.to_string()).await
    }

    async fn flush(&self) -> Result<(), SessionError> {
        // A flagged whitespace frame forces generation of buffered text.
        let frame = serde_json::json!({ "text": " ", "flush": true });
        self.session.send_text(frame.to_string()).await
    }

    async fn clear(&self) -> Result<(), SessionError> {
        // End the provider-side stream, dropping its unspoken buffer, then
        // reset so the next send opens a fresh connection.
        let eos = serde_json::json!({ "text": "" });
        self.session.send_text(eos.to_string()).await?;
        self.session.reset().await;
        Ok(())
    }

    async fn close(&self) {
        self.session.close().await;
    }

    fn audio_events(&self) -> BoxStream<'static, TtsAudio> {
        self.session
            .receive_messages()
            .filter_map(|message| async move {
                match message {
                    Message::Text(text) => {
                        let frame: StreamInputFrame = match serde_json::from_str(&text) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!(error = %e, "skipping malformed synthesis message");
                                return None;
                            }
                        };
                        if let Some(error) = frame.error {
                            warn!(%error, "synthesis provider reported an error");
                            return None;
                        }
                        let encoded = frame.audio.filter(|audio| !audio.is_empty())?;
                        match BASE64.decode(encoded.as_bytes()) {
                            Ok(data) => Some(TtsAudio {
                                data: Bytes::from(data),
                                is_final: frame.is_final.unwrap_or(false),
                            }),
                            Err(e) => {
                                warn!(error = %e, "skipping undecodable audio frame");
                                None
                            }
                        }
                    }
                    Message::Binary(data) => Some(TtsAudio {
                        data,
                        is_final: false,
                    }),
                    _ => None,
                }
            })
            .boxed()
    }
}
