//! OpenAI-compatible streaming chat agent.
//!
//! Issues a streaming chat completions request per turn and yields the reply
//! as content deltas arrive. Conversation history lives in process memory,
//! keyed by conversation id, and grows by one user/assistant pair per
//! completed turn.

use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::agent::{AgentCollaborator, AgentError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful voice assistant. Keep replies short and conversational.";

/// Configuration for [`OpenAiAgent`].
#[derive(Debug, Clone)]
pub struct OpenAiAgentConfig {
    pub api_key: String,
    pub model: String,
    pub system_prompt: String,
    /// API root, without a trailing slash. Override for compatible backends
    /// and for tests.
    pub base_url: String,
    pub temperature: f32,
}

impl Default for OpenAiAgentConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn new(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content,
        }
    }
}

/// Streaming chat agent backed by an OpenAI-compatible API.
pub struct OpenAiAgent {
    client: reqwest::Client,
    config: Arc<OpenAiAgentConfig>,
    history: Arc<DashMap<String, Vec<ChatMessage>>>,
}

impl OpenAiAgent {
    pub fn new(config: OpenAiAgentConfig) -> Result<Self, AgentError> {
        if config.api_key.is_empty() {
            return Err(AgentError::Configuration(
                "OpenAI API key is not set".to_string(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            config: Arc::new(config),
            history: Arc::new(DashMap::new()),
        })
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the content increment from one SSE data payload. `Ok(None)` for
/// payloads that carry no content (role announcements, finish markers).
fn parse_delta(data: &str) -> Result<Option<String>, AgentError> {
    let chunk: StreamChunk =
        serde_json::from_str(data).map_err(|e| AgentError::Malformed(e.to_string()))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content))
}

impl AgentCollaborator for OpenAiAgent {
    fn invoke(
        &self,
        conversation_id: &str,
        utterance: &str,
    ) -> BoxStream<'static, Result<String, AgentError>> {
        let client = self.client.clone();
        let config = self.config.clone();
        let history = self.history.clone();
        let conversation_id = conversation_id.to_string();
        let utterance = utterance.to_string();

        async_stream::stream! {
            'turn: {
                let mut messages = Vec::new();
                if !config.system_prompt.is_empty() {
                    messages.push(ChatMessage::new("system", config.system_prompt.clone()));
                }
                if let Some(prior) = history.get(&conversation_id) {
                    messages.extend(prior.iter().cloned());
                }
                messages.push(ChatMessage::new("user", utterance.clone()));

                let body = serde_json::json!({
                    "model": config.model,
                    "messages": messages,
                    "temperature": config.temperature,
                    "stream": true,
                });

                let response = match client
                    .post(format!("{}/chat/completions", config.base_url))
                    .bearer_auth(&config.api_key)
                    .json(&body)
                    .send()
                    .await
                {
                    Ok(response) => response,
                    Err(e) => {
                        yield Err(AgentError::Request(e.to_string()));
                        break 'turn;
                    }
                };
                let response = match response.error_for_status() {
                    Ok(response) => response,
                    Err(e) => {
                        yield Err(AgentError::Request(e.to_string()));
                        break 'turn;
                    }
                };

                let mut frames = std::pin::pin!(response.bytes_stream());
                let mut buffer = String::new();
                let mut reply = String::new();
                let mut broken = false;

                // The body is server-sent events: newline-delimited lines,
                // content on `data:` lines, `[DONE]` terminating the stream.
                'read: while let Some(chunk) = frames.next().await {
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            yield Err(AgentError::Stream(e.to_string()));
                            broken = true;
                            break 'read;
                        }
                    };
                    buffer.push_str(&String::from_utf8_lossy(&chunk));
                    while let Some(newline) = buffer.find('\n') {
                        let line = buffer[..newline].trim().to_string();
                        buffer.drain(..=newline);
                        let Some(data) = line.strip_prefix("data:") else {
                            continue;
                        };
                        let data = data.trim();
                        if data == "[DONE]" {
                            break 'read;
                        }
                        match parse_delta(data) {
                            Ok(Some(content)) => {
                                reply.push_str(&content);
                                yield Ok(content);
                            }
                            Ok(None) => {}
                            Err(e) => yield Err(e),
                        }
                    }
                }

                if !broken && !reply.is_empty() {
                    let mut entry = history.entry(conversation_id).or_default();
                    entry.push(ChatMessage::new("user", utterance));
                    entry.push(ChatMessage::new("assistant", reply));
                    debug!(turns = entry.len() / 2, "conversation history extended");
                }
            }
        }
        .boxed()
    }
}
