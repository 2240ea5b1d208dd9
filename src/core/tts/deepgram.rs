//! Deepgram streaming TTS client.
//!
//! Speaks the Deepgram speak-WebSocket protocol: `Speak`/`Flush`/`Clear`
//! control frames out, raw audio binary frames in. `Clear` drops queued but
//! not-yet-voiced text, which is what barge-in needs.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, warn};
use url::Url;

use crate::core::session::{ProviderSession, SessionConnector, SessionError, build_ws_request};
use crate::core::tts::{TextToSpeech, TtsAudio, TtsConfig};

/// Deepgram streaming synthesis endpoint.
pub const DEEPGRAM_TTS_URL: &str = "wss://api.deepgram.com/v1/speak";

const DEFAULT_VOICE_MODEL: &str = "aura-2-asteria-en";

struct DeepgramTtsConnector {
    config: TtsConfig,
}

impl SessionConnector for DeepgramTtsConnector {
    fn request(&self) -> Result<http::Request<()>, SessionError> {
        let endpoint = self.config.endpoint.as_deref().unwrap_or(DEEPGRAM_TTS_URL);
        let mut url = Url::parse(endpoint)
            .map_err(|e| SessionError::Configuration(format!("invalid endpoint: {e}")))?;
        let model = self.config.voice_id.as_deref().unwrap_or(DEFAULT_VOICE_MODEL);
        url.query_pairs_mut()
            .append_pair("model", model)
            .append_pair("encoding", "linear16")
            .append_pair("sample_rate", &self.config.sample_rate.to_string());

        build_ws_request(&url, Some(format!("Token {}", self.config.api_key)))
    }

    fn provider_name(&self) -> &'static str {
        "deepgram-tts"
    }
}

/// Deepgram streaming TTS session.
pub struct DeepgramTts {
    session: ProviderSession,
}

impl DeepgramTts {
    pub fn new(config: TtsConfig) -> Result<Self, SessionError> {
        if config.api_key.is_empty() {
            return Err(SessionError::Configuration(
                "Deepgram API key is not set".to_string(),
            ));
        }
        Ok(Self {
            session: ProviderSession::new(Box::new(DeepgramTtsConnector { config })),
        })
    }

    async fn send_control(&self, kind: &str) -> Result<(), SessionError> {
        let frame = serde_json::json!({ "type": kind });
        self.session.send_text(frame.to_string()).await
    }
}

#[derive(Deserialize)]
struct SpeakMetadata {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[async_trait]
impl TextToSpeech for DeepgramTts {
    async fn send_text(&self, text: &str) -> Result<(), SessionError> {
        let frame = serde_json::json!({ "type": "Speak", "text": text });
        self.session.send_text(frame.to_string()).await
    }

    async fn flush(&self) -> Result<(), SessionError> {
        self.send_control("Flush").await
    }

    async fn clear(&self) -> Result<(), SessionError> {
        self.send_control("Clear").await
    }

    async fn close(&self) {
        self.session.close().await;
    }

    fn audio_events(&self) -> BoxStream<'static, TtsAudio> {
        self.session
            .receive_messages()
            .filter_map(|message| async move {
                match message {
                    Message::Binary(data) => Some(TtsAudio {
                        data,
                        is_final: false,
                    }),
                    Message::Text(text) => {
                        match serde_json::from_str::<SpeakMetadata>(&text) {
                            Ok(meta) => {
                                if let Some(error) = meta.error {
                                    warn!(%error, "synthesis provider reported an error");
                                } else {
                                    debug!(kind = ?meta.kind, "synthesis metadata");
                                }
                            }
                            Err(e) => warn!(error = %e, "skipping malformed synthesis message"),
                        }
                        None
                    }
                    _ => None,
                }
            })
            .boxed()
    }
}
