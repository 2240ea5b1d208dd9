//! Pipeline event model.
//!
//! Every stage of the voice pipeline consumes and produces [`VoiceAgentEvent`]
//! values. An event is created by exactly one stage and then moves by value
//! through the stages downstream of it: each stage re-emits what it received
//! (passthrough) and injects its own events, so the transport at the end of
//! the pipeline observes the full event history.
//!
//! On the wire each event is a self-describing JSON record with a `type`
//! discriminant, the kind-specific fields, and a `timestamp` in epoch
//! milliseconds added at the transport boundary (see [`WireEvent`]).

use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// One event flowing through the voice pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoiceAgentEvent {
    /// Partial (interim) transcript of in-progress user speech.
    SttChunk { text: String },
    /// One finalized, turn-complete user utterance.
    SttOutput { text: String },
    /// A streamed increment of the agent's reply.
    AgentChunk { text: String },
    /// The agent's full reply for one turn, emitted after the last increment.
    AgentEnd { text: String },
    /// Reserved: a tool invocation requested by the agent. Passthrough-only
    /// today; no stage produces it.
    ToolCall {
        tool_name: String,
        args: serde_json::Value,
    },
    /// Reserved: the result of a tool invocation. Passthrough-only today.
    ToolReturn {
        tool_name: String,
        args: serde_json::Value,
        result: String,
    },
    /// A frame of synthesized audio.
    TtsChunk {
        #[serde(with = "base64_bytes")]
        audio: Bytes,
        #[serde(default)]
        is_final: bool,
    },
    /// Barge-in: the user started speaking while a reply was being voiced.
    Interrupt,
}

impl VoiceAgentEvent {
    /// The wire discriminant for this event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            VoiceAgentEvent::SttChunk { .. } => "stt_chunk",
            VoiceAgentEvent::SttOutput { .. } => "stt_output",
            VoiceAgentEvent::AgentChunk { .. } => "agent_chunk",
            VoiceAgentEvent::AgentEnd { .. } => "agent_end",
            VoiceAgentEvent::ToolCall { .. } => "tool_call",
            VoiceAgentEvent::ToolReturn { .. } => "tool_return",
            VoiceAgentEvent::TtsChunk { .. } => "tts_chunk",
            VoiceAgentEvent::Interrupt => "interrupt",
        }
    }
}

/// An event as serialized to the client: the tagged record plus a timestamp.
#[derive(Serialize)]
pub struct WireEvent<'a> {
    #[serde(flatten)]
    event: &'a VoiceAgentEvent,
    timestamp: u64,
}

impl<'a> WireEvent<'a> {
    pub fn new(event: &'a VoiceAgentEvent) -> Self {
        Self {
            event,
            timestamp: epoch_millis(),
        }
    }
}

/// Current time as epoch milliseconds, saturating at zero on clock skew.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Serde helper encoding audio payloads as standard base64 strings.
mod base64_bytes {
    use super::{BASE64, Bytes};
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    #[test]
    fn test_stt_output_wire_format() {
        let event = VoiceAgentEvent::SttOutput {
            text: "hello there".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "stt_output");
        assert_eq!(value["text"], "hello there");
    }

    #[test]
    fn test_interrupt_carries_only_its_tag() {
        let value = serde_json::to_value(VoiceAgentEvent::Interrupt).unwrap();
        assert_eq!(value, serde_json::json!({ "type": "interrupt" }));
    }

    #[test]
    fn test_tts_chunk_audio_is_base64() {
        let event = VoiceAgentEvent::TtsChunk {
            audio: Bytes::from_static(&[0x01, 0x02, 0x03]),
            is_final: false,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "tts_chunk");
        assert_eq!(value["audio"], BASE64.encode([0x01, 0x02, 0x03]));

        let decoded: VoiceAgentEvent = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn test_wire_event_includes_timestamp() {
        let event = VoiceAgentEvent::AgentChunk {
            text: "hi".to_string(),
        };
        let value = serde_json::to_value(WireEvent::new(&event)).unwrap();
        assert_eq!(value["type"], "agent_chunk");
        assert_eq!(value["text"], "hi");
        assert!(value["timestamp"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_kind_matches_wire_discriminant() {
        let event = VoiceAgentEvent::AgentEnd {
            text: String::new(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], event.kind());
    }
}
