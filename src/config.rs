use crate::defaults;
use crate::error::{MouthpieceError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub pipeline: PipelineSettings,
    pub tools: ToolsConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Backend provider selection and credentials
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub provider: Provider,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub model: String,
    pub voice: String,
    pub system_prompt: String,
    pub seline_url: String,
    pub seline_agent_id: Option<String>,
    pub seline_session_id: Option<String>,
}

/// Backend provider enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI-style HTTP API (transcription, chat completions, speech)
    OpenAi,
    /// Remote Seline agent service
    Seline,
}

/// Per-turn pipeline limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    pub max_sentences: usize,
    pub max_history: usize,
}

/// External executables used by the pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg: PathBuf,
    pub rhubarb: PathBuf,
    pub phoneme_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::DEFAULT_HOST.to_string(),
            port: defaults::DEFAULT_PORT,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            openai_api_key: None,
            openai_base_url: defaults::DEFAULT_OPENAI_BASE_URL.to_string(),
            model: defaults::DEFAULT_MODEL.to_string(),
            voice: defaults::DEFAULT_VOICE.to_string(),
            system_prompt: defaults::DEFAULT_SYSTEM_PROMPT.to_string(),
            seline_url: defaults::DEFAULT_SELINE_URL.to_string(),
            seline_agent_id: None,
            seline_session_id: None,
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_sentences: defaults::MAX_SENTENCES_PER_TURN,
            max_history: defaults::MAX_HISTORY_MESSAGES,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from(defaults::DEFAULT_FFMPEG),
            rhubarb: PathBuf::from(defaults::DEFAULT_RHUBARB),
            phoneme_timeout_secs: defaults::PHONEME_TIMEOUT_SECS,
        }
    }
}

impl ToolsConfig {
    pub fn phoneme_timeout(&self) -> Duration {
        Duration::from_secs(self.phoneme_timeout_secs)
    }
}

impl std::str::FromStr for Provider {
    type Err = MouthpieceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "standalone" => Ok(Provider::OpenAi),
            "seline" => Ok(Provider::Seline),
            other => Err(MouthpieceError::ConfigInvalidValue {
                key: "backend.provider".to_string(),
                message: format!("unknown provider '{other}' (expected openai or seline)"),
            }),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e)
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(e.context(format!("Failed to load config from {}", path.display()))),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - AVATAR_HOST → server.host
    /// - AVATAR_PORT → server.port
    /// - AVATAR_PROVIDER → backend.provider
    /// - OPENAI_API_KEY → backend.openai_api_key
    /// - AVATAR_MODEL → backend.model
    /// - AVATAR_VOICE → backend.voice
    /// - AVATAR_SYSTEM_PROMPT → backend.system_prompt
    /// - SELINE_URL → backend.seline_url
    /// - SELINE_AGENT_ID → backend.seline_agent_id
    /// - SELINE_SESSION_ID → backend.seline_session_id
    /// - MOUTHPIECE_FFMPEG → tools.ffmpeg
    /// - MOUTHPIECE_RHUBARB → tools.rhubarb
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(host) = env_value("AVATAR_HOST") {
            self.server.host = host;
        }

        if let Some(port) = env_value("AVATAR_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| MouthpieceError::ConfigInvalidValue {
                    key: "AVATAR_PORT".to_string(),
                    message: format!("{e}"),
                })?;
        }

        if let Some(provider) = env_value("AVATAR_PROVIDER") {
            self.backend.provider = provider.parse()?;
        }

        if let Some(key) = env_value("OPENAI_API_KEY") {
            self.backend.openai_api_key = Some(key);
        }

        if let Some(model) = env_value("AVATAR_MODEL") {
            self.backend.model = model;
        }

        if let Some(voice) = env_value("AVATAR_VOICE") {
            self.backend.voice = voice;
        }

        if let Some(prompt) = env_value("AVATAR_SYSTEM_PROMPT") {
            self.backend.system_prompt = prompt;
        }

        if let Some(url) = env_value("SELINE_URL") {
            self.backend.seline_url = url;
        }

        if let Some(agent_id) = env_value("SELINE_AGENT_ID") {
            self.backend.seline_agent_id = Some(agent_id);
        }

        if let Some(session_id) = env_value("SELINE_SESSION_ID") {
            self.backend.seline_session_id = Some(session_id);
        }

        if let Some(ffmpeg) = env_value("MOUTHPIECE_FFMPEG") {
            self.tools.ffmpeg = PathBuf::from(ffmpeg);
        }

        if let Some(rhubarb) = env_value("MOUTHPIECE_RHUBARB") {
            self.tools.rhubarb = PathBuf::from(rhubarb);
        }

        Ok(self)
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.backend.provider == Provider::OpenAi
            && self
                .backend
                .openai_api_key
                .as_deref()
                .is_none_or(|key| key.trim().is_empty())
        {
            return Err(MouthpieceError::ConfigInvalidValue {
                key: "backend.openai_api_key".to_string(),
                message: "required for the openai provider (set OPENAI_API_KEY)".to_string(),
            });
        }

        if self.pipeline.max_sentences == 0 {
            return Err(MouthpieceError::ConfigInvalidValue {
                key: "pipeline.max_sentences".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.pipeline.max_history % 2 != 0 {
            return Err(MouthpieceError::ConfigInvalidValue {
                key: "pipeline.max_history".to_string(),
                message: format!(
                    "must be even (one user and one assistant message per turn), got {}",
                    self.pipeline.max_history
                ),
            });
        }

        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/mouthpiece/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("mouthpiece")
            .join("config.toml")
    }
}

/// Non-empty value of an environment variable.
fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}
