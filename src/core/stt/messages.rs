//! Deepgram listen-API message parsing.

use serde::Deserialize;
use tracing::{debug, warn};

/// One recognition result, normalized from the provider's wire format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionEvent {
    /// Best-alternative transcript for this result. May be empty.
    pub transcript: String,
    /// The fragment is finalized and will not be revised.
    pub is_final: bool,
    /// The fragment closes a turn of user speech.
    pub speech_final: bool,
}

impl RecognitionEvent {
    /// An interim (still revisable) fragment.
    pub fn interim(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: false,
            speech_final: false,
        }
    }

    /// A finalized fragment that does not close the turn.
    pub fn final_fragment(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: true,
            speech_final: false,
        }
    }

    /// A turn-final fragment.
    pub fn turn_final(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: true,
            speech_final: true,
        }
    }
}

#[derive(Deserialize)]
struct ListenMessage {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    channel: Option<Channel>,
    #[serde(default)]
    is_final: Option<bool>,
    #[serde(default)]
    speech_final: Option<bool>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct Channel {
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
}

/// Parse one inbound text frame. Malformed or non-result frames are logged
/// and dropped; they never fail the session.
pub(crate) fn parse_recognition(raw: &str) -> Option<RecognitionEvent> {
    let message: ListenMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "skipping malformed transcription message");
            return None;
        }
    };

    if let Some(error) = message.error {
        warn!(%error, "transcription provider reported an error");
        return None;
    }

    match message.kind.as_deref() {
        Some("Results") => {
            let transcript = message
                .channel
                .and_then(|c| c.alternatives.into_iter().next())
                .map(|a| a.transcript)
                .unwrap_or_default();
            Some(RecognitionEvent {
                transcript,
                is_final: message.is_final.unwrap_or(false),
                speech_final: message.speech_final.unwrap_or(false),
            })
        }
        Some("Metadata") => None,
        other => {
            debug!(kind = ?other, "ignoring transcription message");
            None
        }
    }
}
