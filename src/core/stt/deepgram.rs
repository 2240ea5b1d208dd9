//! Deepgram streaming STT client.
//!
//! Connects to the Deepgram listen WebSocket API, forwarding raw 16-bit
//! linear PCM mono audio and yielding recognition results. The connection is
//! established lazily on the first `send_audio` and negotiated via query
//! parameters (encoding, sample rate, endpointing, interim results).

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use url::Url;

use crate::core::session::{ProviderSession, SessionConnector, SessionError, build_ws_request};
use crate::core::stt::SpeechToText;
use crate::core::stt::messages::{RecognitionEvent, parse_recognition};

/// Deepgram streaming transcription endpoint.
pub const DEEPGRAM_STT_URL: &str = "wss://api.deepgram.com/v1/listen";

/// Configuration for [`DeepgramStt`].
#[derive(Debug, Clone)]
pub struct DeepgramSttConfig {
    pub api_key: String,
    /// Input sample rate in Hz; must match the inbound audio.
    pub sample_rate: u32,
    pub model: String,
    pub language: String,
    /// Silence duration (ms) after which the provider closes the turn.
    pub endpointing_ms: u32,
    /// Emit interim (revisable) results.
    pub interim_results: bool,
    /// Provider-side punctuation and capitalization.
    pub smart_format: bool,
    /// Endpoint override for tests.
    pub endpoint: String,
}

impl Default for DeepgramSttConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            sample_rate: 16000,
            model: "nova-3".to_string(),
            language: "en-US".to_string(),
            endpointing_ms: 300,
            interim_results: true,
            smart_format: true,
            endpoint: DEEPGRAM_STT_URL.to_string(),
        }
    }
}

struct DeepgramSttConnector {
    config: DeepgramSttConfig,
}

impl SessionConnector for DeepgramSttConnector {
    fn request(&self) -> Result<http::Request<()>, SessionError> {
        let config = &self.config;
        let mut url = Url::parse(&config.endpoint)
            .map_err(|e| SessionError::Configuration(format!("invalid endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("model", &config.model)
            .append_pair("language", &config.language)
            // Raw 16-bit PCM, mono; must match the inbound audio frames.
            .append_pair("encoding", "linear16")
            .append_pair("channels", "1")
            .append_pair("sample_rate", &config.sample_rate.to_string())
            .append_pair("smart_format", bool_param(config.smart_format))
            .append_pair("endpointing", &config.endpointing_ms.to_string())
            .append_pair("interim_results", bool_param(config.interim_results));

        build_ws_request(&url, Some(format!("Token {}", config.api_key)))
    }

    fn provider_name(&self) -> &'static str {
        "deepgram-stt"
    }
}

/// Deepgram streaming STT session.
pub struct DeepgramStt {
    session: ProviderSession,
}

impl DeepgramStt {
    /// Build a client. Fails immediately if the API key is missing - that is
    /// a deployment error, not something to discover on the first send.
    pub fn new(config: DeepgramSttConfig) -> Result<Self, SessionError> {
        if config.api_key.is_empty() {
            return Err(SessionError::Configuration(
                "Deepgram API key is not set".to_string(),
            ));
        }
        Ok(Self {
            session: ProviderSession::new(Box::new(DeepgramSttConnector { config })),
        })
    }
}

#[async_trait]
impl SpeechToText for DeepgramStt {
    async fn send_audio(&self, audio: Bytes) -> Result<(), SessionError> {
        self.session.send_binary(audio).await
    }

    async fn close(&self) {
        self.session.close().await;
    }

    fn recognition_events(&self) -> BoxStream<'static, RecognitionEvent> {
        self.session
            .receive_messages()
            .filter_map(|message| async move {
                match message {
                    Message::Text(text) => parse_recognition(&text),
                    _ => None,
                }
            })
            .boxed()
    }
}

fn bool_param(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}
