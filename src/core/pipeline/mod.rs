//! The voice agent pipeline.
//!
//! Audio flows through three stages, each consuming its upstream's event
//! stream and producing its own: recognition ([`stt_stage`]) turns audio
//! into transcripts, the agent stage inserts the collaborator's streamed
//! replies, and synthesis ([`tts_stage`]) voices them and injects the
//! audio frames. Stages pass through every event they receive, so the
//! final stream carries the full event history in order.

mod agent_stage;
mod stt_stage;
mod tts_stage;

pub use tts_stage::BargeInController;

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use tracing::info;
use uuid::Uuid;

use crate::core::agent::AgentCollaborator;
use crate::core::merge::EventStream;
use crate::core::stt::SpeechToText;
use crate::core::tts::TextToSpeech;

/// One assembled pipeline: recognition, agent and synthesis providers wired
/// in order. Cheap to construct; sessions connect lazily on first use.
pub struct VoicePipeline {
    stt: Arc<dyn SpeechToText>,
    agent: Arc<dyn AgentCollaborator>,
    tts: Arc<dyn TextToSpeech>,
}

impl VoicePipeline {
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        agent: Arc<dyn AgentCollaborator>,
        tts: Arc<dyn TextToSpeech>,
    ) -> Self {
        Self { stt, agent, tts }
    }

    /// Run the pipeline over one connection's audio. Each run is one
    /// conversation: a fresh id scopes the agent's history to it.
    ///
    /// The returned stream ends when the audio source ends and trailing
    /// events have drained, or after the first fatal error.
    pub fn run(&self, audio: BoxStream<'static, Bytes>) -> EventStream {
        let conversation_id = Uuid::new_v4().to_string();
        info!(conversation = %conversation_id, "starting pipeline run");

        let recognized = stt_stage::run(self.stt.clone(), audio);
        let replied = agent_stage::run(self.agent.clone(), conversation_id, recognized);
        tts_stage::run(self.tts.clone(), replied)
    }
}
