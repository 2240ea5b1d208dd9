//! Shared application state.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::agent::{AgentCollaborator, AgentError, OpenAiAgent, OpenAiAgentConfig};
use crate::core::pipeline::VoicePipeline;
use crate::core::session::SessionError;
use crate::core::stt::{DeepgramStt, DeepgramSttConfig};
use crate::core::tts::{TtsConfig, create_tts_provider};

/// State shared across connections.
///
/// The agent is shared so conversation history survives for the process
/// lifetime; provider sessions are per-connection and built by
/// [`build_pipeline`](Self::build_pipeline).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    agent: Arc<dyn AgentCollaborator>,
}

impl AppState {
    /// Build the application state. Fails when the agent's API key is
    /// missing; provider keys are checked per connection.
    pub fn new(config: ServerConfig) -> Result<Self, AgentError> {
        let defaults = OpenAiAgentConfig::default();
        let agent = OpenAiAgent::new(OpenAiAgentConfig {
            api_key: config.openai_api_key.clone().unwrap_or_default(),
            model: config.llm_model.clone().unwrap_or(defaults.model),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or(defaults.system_prompt),
            base_url: defaults.base_url,
            temperature: defaults.temperature,
        })?;
        Ok(Self {
            config: Arc::new(config),
            agent: Arc::new(agent),
        })
    }

    /// Assemble a pipeline for one connection: fresh recognition and
    /// synthesis sessions around the shared agent.
    pub fn build_pipeline(&self) -> Result<VoicePipeline, SessionError> {
        let stt = DeepgramStt::new(DeepgramSttConfig {
            api_key: self.config.deepgram_api_key.clone().unwrap_or_default(),
            sample_rate: self.config.input_sample_rate,
            ..Default::default()
        })?;

        let tts_api_key = match self.config.tts_provider.to_lowercase().as_str() {
            "deepgram" => self.config.deepgram_api_key.clone(),
            _ => self.config.elevenlabs_api_key.clone(),
        };
        let tts = create_tts_provider(
            &self.config.tts_provider,
            TtsConfig {
                api_key: tts_api_key.unwrap_or_default(),
                voice_id: self.config.tts_voice_id.clone(),
                sample_rate: self.config.output_sample_rate,
                endpoint: None,
            },
        )?;

        Ok(VoicePipeline::new(
            Arc::new(stt),
            self.agent.clone(),
            Arc::from(tts),
        ))
    }
}
