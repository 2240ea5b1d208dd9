//! Server configuration.
//!
//! Configuration comes from environment variables (with a `.env` file loaded
//! at startup) and optionally a YAML file. Priority: YAML > environment
//! variables > defaults. Validation runs after merging, so a bad value fails
//! startup rather than the first connection.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// Supported synthesis provider names, for validation and error messages.
const TTS_PROVIDERS: &[&str] = &["deepgram", "elevenlabs"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid value for {name}: {message}")]
    Invalid {
        name: &'static str,
        message: String,
    },
}

/// Server configuration.
///
/// Provider API keys are optional here; whether a key is required depends on
/// which providers the server is configured to use, and that is checked when
/// the application state is built.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    /// CORS allowed origins (comma-separated list or "*" for all).
    /// Default: None (same-origin only).
    pub cors_allowed_origins: Option<String>,

    // Provider API keys
    pub deepgram_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub openai_api_key: Option<String>,

    // Agent settings
    /// Chat model name; the agent's default when `None`.
    pub llm_model: Option<String>,
    /// System prompt override for the agent.
    pub system_prompt: Option<String>,

    // Pipeline settings
    /// Synthesis provider name ("deepgram" or "elevenlabs").
    pub tts_provider: String,
    /// Synthesis voice/model identifier; provider default when `None`.
    pub tts_voice_id: Option<String>,
    /// Sample rate of inbound client audio in Hz.
    pub input_sample_rate: u32,
    /// Sample rate of synthesized audio in Hz.
    pub output_sample_rate: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            cors_allowed_origins: None,
            deepgram_api_key: None,
            elevenlabs_api_key: None,
            openai_api_key: None,
            llm_model: None,
            system_prompt: None,
            tts_provider: "deepgram".to_string(),
            tts_voice_id: None,
            input_sample_rate: 16000,
            output_sample_rate: 24000,
        }
    }
}

/// YAML file shape: every field optional, overriding the environment base.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct YamlConfig {
    host: Option<String>,
    port: Option<u16>,
    cors_allowed_origins: Option<String>,
    deepgram_api_key: Option<String>,
    elevenlabs_api_key: Option<String>,
    openai_api_key: Option<String>,
    llm_model: Option<String>,
    system_prompt: Option<String>,
    tts_provider: Option<String>,
    tts_voice_id: Option<String>,
    input_sample_rate: Option<u32>,
    output_sample_rate: Option<u32>,
}

impl ServerConfig {
    /// Load configuration from environment variables over defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            host: env_string("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT")?.unwrap_or(defaults.port),
            cors_allowed_origins: env_string("CORS_ALLOWED_ORIGINS"),
            deepgram_api_key: env_string("DEEPGRAM_API_KEY"),
            elevenlabs_api_key: env_string("ELEVENLABS_API_KEY"),
            openai_api_key: env_string("OPENAI_API_KEY"),
            llm_model: env_string("LLM_MODEL"),
            system_prompt: env_string("SYSTEM_PROMPT"),
            tts_provider: env_string("TTS_PROVIDER").unwrap_or(defaults.tts_provider),
            tts_voice_id: env_string("TTS_VOICE_ID"),
            input_sample_rate: env_parse("INPUT_SAMPLE_RATE")?
                .unwrap_or(defaults.input_sample_rate),
            output_sample_rate: env_parse("OUTPUT_SAMPLE_RATE")?
                .unwrap_or(defaults.output_sample_rate),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, with environment variables as the
    /// base for fields the file does not set.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let yaml: YamlConfig =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let base = Self::from_env()?;
        let config = Self {
            host: yaml.host.unwrap_or(base.host),
            port: yaml.port.unwrap_or(base.port),
            cors_allowed_origins: yaml.cors_allowed_origins.or(base.cors_allowed_origins),
            deepgram_api_key: yaml.deepgram_api_key.or(base.deepgram_api_key),
            elevenlabs_api_key: yaml.elevenlabs_api_key.or(base.elevenlabs_api_key),
            openai_api_key: yaml.openai_api_key.or(base.openai_api_key),
            llm_model: yaml.llm_model.or(base.llm_model),
            system_prompt: yaml.system_prompt.or(base.system_prompt),
            tts_provider: yaml.tts_provider.unwrap_or(base.tts_provider),
            tts_voice_id: yaml.tts_voice_id.or(base.tts_voice_id),
            input_sample_rate: yaml.input_sample_rate.unwrap_or(base.input_sample_rate),
            output_sample_rate: yaml.output_sample_rate.unwrap_or(base.output_sample_rate),
        };
        config.validate()?;
        Ok(config)
    }

    /// The server address as "host:port".
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !TTS_PROVIDERS.contains(&self.tts_provider.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid {
                name: "tts_provider",
                message: format!(
                    "unsupported provider {:?}, expected one of {:?}",
                    self.tts_provider, TTS_PROVIDERS
                ),
            });
        }
        if self.input_sample_rate == 0 {
            return Err(ConfigError::Invalid {
                name: "input_sample_rate",
                message: "must be a positive sample rate in Hz".to_string(),
            });
        }
        if self.output_sample_rate == 0 {
            return Err(ConfigError::Invalid {
                name: "output_sample_rate",
                message: "must be a positive sample rate in Hz".to_string(),
            });
        }
        Ok(())
    }
}

/// Read a non-empty environment variable.
fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

/// Read and parse an environment variable; `Ok(None)` when unset or empty.
fn env_parse<T>(name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                name,
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_VARS: &[&str] = &[
        "HOST",
        "PORT",
        "CORS_ALLOWED_ORIGINS",
        "DEEPGRAM_API_KEY",
        "ELEVENLABS_API_KEY",
        "OPENAI_API_KEY",
        "LLM_MODEL",
        "SYSTEM_PROMPT",
        "TTS_PROVIDER",
        "TTS_VOICE_ID",
        "INPUT_SAMPLE_RATE",
        "OUTPUT_SAMPLE_RATE",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            unsafe { env::remove_var(name) };
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.address(), "0.0.0.0:3001");
        assert_eq!(config.tts_provider, "deepgram");
        assert_eq!(config.input_sample_rate, 16000);
        assert_eq!(config.output_sample_rate, 24000);
        assert!(config.deepgram_api_key.is_none());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        unsafe {
            env::set_var("HOST", "127.0.0.1");
            env::set_var("PORT", "9000");
            env::set_var("DEEPGRAM_API_KEY", "dg-key");
            env::set_var("TTS_PROVIDER", "elevenlabs");
        }
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.address(), "127.0.0.1:9000");
        assert_eq!(config.deepgram_api_key.as_deref(), Some("dg-key"));
        assert_eq!(config.tts_provider, "elevenlabs");
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_port_is_rejected() {
        clear_env();
        unsafe { env::set_var("PORT", "not-a-port") };
        let result = ServerConfig::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_unknown_tts_provider_is_rejected() {
        clear_env();
        unsafe { env::set_var("TTS_PROVIDER", "hal9000") };
        let result = ServerConfig::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                name: "tts_provider",
                ..
            })
        ));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_yaml_overrides_environment() {
        clear_env();
        unsafe {
            env::set_var("PORT", "9000");
            env::set_var("OPENAI_API_KEY", "env-key");
        }
        let dir = std::env::temp_dir();
        let path = dir.join("voxbridge-config-test.yaml");
        std::fs::write(&path, "port: 4242\nhost: \"localhost\"\n").unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.address(), "localhost:4242");
        // Fields the file does not set keep their environment values.
        assert_eq!(config.openai_api_key.as_deref(), Some("env-key"));

        std::fs::remove_file(&path).ok();
        clear_env();
    }

    #[test]
    #[serial]
    fn test_unknown_yaml_field_is_rejected() {
        clear_env();
        let dir = std::env::temp_dir();
        let path = dir.join("voxbridge-config-unknown-field.yaml");
        std::fs::write(&path, "porf: 4242\n").unwrap();

        let result = ServerConfig::from_file(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));

        std::fs::remove_file(&path).ok();
    }
}
