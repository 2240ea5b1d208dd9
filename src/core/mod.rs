pub mod agent;
pub mod events;
pub mod merge;
pub mod pipeline;
pub mod session;
pub mod stt;
pub mod tts;

pub use agent::{AgentCollaborator, AgentError};
pub use events::VoiceAgentEvent;
pub use merge::StreamMerger;
pub use pipeline::VoicePipeline;
pub use session::{ProviderSession, SessionConnector, SessionError};
pub use stt::{DeepgramStt, DeepgramSttConfig, RecognitionEvent, SpeechToText, TranscriptAssembler};
pub use tts::{TextToSpeech, TtsAudio, TtsConfig, create_tts_provider};
