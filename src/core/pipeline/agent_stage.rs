//! Agent stage: invokes the collaborator on each finalized utterance.
//!
//! Every upstream event passes through unchanged. An `stt_output` starts one
//! agent turn: the reply streams out as `agent_chunk` events while upstream
//! consumption pauses, and the concatenation of the increments follows as
//! `agent_end`. A turn that produces no text produces no `agent_end` either.

use std::pin::pin;
use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::core::agent::{AgentCollaborator, AgentError};
use crate::core::events::VoiceAgentEvent;
use crate::core::merge::EventStream;
use crate::errors::PipelineError;

pub(crate) fn run(
    agent: Arc<dyn AgentCollaborator>,
    conversation_id: String,
    upstream: EventStream,
) -> EventStream {
    async_stream::stream! {
        let mut upstream = pin!(upstream);
        'stage: while let Some(result) = upstream.next().await {
            let event = match result {
                Ok(event) => event,
                Err(e) => {
                    yield Err(e);
                    break 'stage;
                }
            };
            let utterance = match &event {
                VoiceAgentEvent::SttOutput { text } => Some(text.clone()),
                _ => None,
            };
            yield Ok(event);
            let Some(utterance) = utterance else {
                continue;
            };

            debug!(conversation = %conversation_id, "starting agent turn");
            let mut reply = agent.invoke(&conversation_id, &utterance);
            let mut accumulated = String::new();
            while let Some(increment) = reply.next().await {
                match increment {
                    Ok(text) if text.is_empty() => {
                        debug!("skipping empty agent increment");
                    }
                    Ok(text) => {
                        accumulated.push_str(&text);
                        yield Ok(VoiceAgentEvent::AgentChunk { text });
                    }
                    // Malformed payloads are contained; the turn continues.
                    Err(AgentError::Malformed(message)) => {
                        warn!(%message, "skipping malformed agent payload");
                    }
                    Err(e) => {
                        yield Err(PipelineError::Agent(e));
                        break 'stage;
                    }
                }
            }
            if !accumulated.is_empty() {
                yield Ok(VoiceAgentEvent::AgentEnd { text: accumulated });
            }
        }
    }
    .boxed()
}
