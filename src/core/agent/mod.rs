//! Conversational agent seam.
//!
//! The pipeline hands each finalized utterance to an [`AgentCollaborator`]
//! and relays the reply as it streams in. The shipped implementation talks to
//! an OpenAI-compatible chat completions API; anything that can turn an
//! utterance into a stream of text increments fits behind the trait.

mod openai;

pub use openai::{OpenAiAgent, OpenAiAgentConfig};

use futures::stream::BoxStream;
use thiserror::Error;

/// Errors produced by agent invocations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// A required credential or setting is missing.
    #[error("agent configuration error: {0}")]
    Configuration(String),

    /// The request could not be issued or was rejected outright.
    #[error("agent request failed: {0}")]
    Request(String),

    /// The response stream broke mid-reply.
    #[error("agent stream failed: {0}")]
    Stream(String),

    /// One streamed payload could not be parsed. Recoverable: the pipeline
    /// skips the payload and keeps reading.
    #[error("malformed agent payload: {0}")]
    Malformed(String),
}

/// A conversational agent that streams its reply incrementally.
///
/// The returned stream ends when the reply is complete; stream end is the
/// end-of-turn signal, there is no separate marker.
pub trait AgentCollaborator: Send + Sync {
    /// Start one agent turn for `utterance` within the conversation
    /// identified by `conversation_id`. History handling is the
    /// implementation's concern.
    fn invoke(
        &self,
        conversation_id: &str,
        utterance: &str,
    ) -> BoxStream<'static, Result<String, AgentError>>;
}
