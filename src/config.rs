//! Configuration
//!
//! Loaded from YAML, with credentials and the model name overridable from
//! the environment. Credentials never leave this struct; snapshots do not
//! carry them.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const ENV_API_KEY: &str = "SCENESYNTH_API_KEY";
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_MODEL: &str = "SCENESYNTH_MODEL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Gemini,
    OpenAI,
    Ollama,
}

/// Language-model collaborator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Model name (e.g., "gemini-2.0-flash", "gpt-4o", "llama3")
    pub model: String,
    /// API key (optional, can be loaded from env if None)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// API base URL (required for Ollama, optional for others)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    /// Replaces the built-in system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            provider: LlmProvider::Gemini,
            model: "gemini-2.0-flash".to_string(),
            api_key: None,
            api_base_url: None,
            system_prompt: None,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Image-rendering collaborator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    /// Preset name or free-text style
    pub default_style: String,
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            model: "gemini-2.0-flash-exp-image-generation".to_string(),
            api_key: None,
            api_base_url: None,
            default_style: "top-down game art".to_string(),
            timeout_secs: 120,
        }
    }
}

impl RenderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Node-count bounds for generated graphs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationLimits {
    pub default_node_count: usize,
    pub min_node_count: usize,
    pub max_node_count: usize,
}

impl Default for GenerationLimits {
    fn default() -> Self {
        GenerationLimits {
            default_node_count: 8,
            min_node_count: 3,
            max_node_count: 20,
        }
    }
}

impl GenerationLimits {
    /// Requested count clamped into bounds; `None` gives the default
    pub fn node_count(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_node_count)
            .clamp(self.min_node_count, self.max_node_count)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSynthConfig {
    pub llm: LlmConfig,
    pub render: RenderConfig,
    pub generation: GenerationLimits,
}

impl SceneSynthConfig {
    /// Read a YAML file and apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_yaml(&text)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults with environment overrides, for runs without a config file
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Fill credentials and model from the environment
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let key = lookup(ENV_API_KEY)
            .or_else(|| lookup(ENV_GEMINI_API_KEY))
            .filter(|k| !k.trim().is_empty());
        if let Some(key) = key {
            self.llm.api_key = Some(key.clone());
            self.render.api_key.get_or_insert(key);
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|m| !m.trim().is_empty()) {
            self.llm.model = model;
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let limits = &self.generation;
        if limits.min_node_count == 0 {
            return Err(ConfigError::Invalid(
                "generation.min_node_count must be at least 1".to_string(),
            ));
        }
        if limits.min_node_count > limits.max_node_count {
            return Err(ConfigError::Invalid(format!(
                "generation.min_node_count ({}) exceeds max_node_count ({})",
                limits.min_node_count, limits.max_node_count
            )));
        }
        if self.llm.timeout_secs == 0 || self.render.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be non-zero".to_string()));
        }
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::Invalid("llm.model must be set".to_string()));
        }
        if self.llm.provider == LlmProvider::Ollama && self.llm.api_base_url.is_none() {
            return Err(ConfigError::Invalid(
                "llm.api_base_url is required for Ollama".to_string(),
            ));
        }
        Ok(())
    }
}
