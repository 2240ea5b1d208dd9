//! Pipeline-level error type.
//!
//! Per-message problems (an unparseable provider frame, an empty agent
//! increment) are contained at the stage that encounters them: logged and
//! skipped, never surfaced here. A [`PipelineError`] is the fatal kind - it
//! terminates the merged event stream and triggers teardown of every provider
//! session, so the transport can send an error frame and close instead of
//! leaving a silently stuck connection.

use thiserror::Error;

use crate::core::agent::AgentError;
use crate::core::session::SessionError;

/// A failure that terminates a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A provider session failed (handshake, network write, use-after-close).
    #[error("provider session error: {0}")]
    Session(#[from] SessionError),

    /// The agent collaborator's reply stream failed.
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    /// An upstream source feeding the pipeline failed.
    #[error("upstream failure: {0}")]
    Upstream(String),
}
