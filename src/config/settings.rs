//! Configuration settings for BookMind.

use crate::error::{BookMindError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variables consulted when the configured key variable is unset.
const API_KEY_FALLBACK_ENVS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub server: ServerSettings,
    pub model: ModelSettings,
    pub agent: AgentSettings,
    pub sessions: SessionSettings,
    pub catalog: CatalogSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
    /// Origins allowed by CORS. `*` allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:5173".to_string()],
        }
    }
}

/// Hosted model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Base URL of the OpenAI-compatible chat completions API.
    pub api_base: String,
    /// Model identifier.
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 60,
            temperature: 0.7,
        }
    }
}

impl ModelSettings {
    /// Resolve the API key from the configured variable, then the Gemini fallbacks.
    pub fn api_key(&self) -> Result<String> {
        std::iter::once(self.api_key_env.as_str())
            .chain(API_KEY_FALLBACK_ENVS.iter().copied())
            .filter_map(|name| std::env::var(name).ok())
            .find(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                BookMindError::Config(format!(
                    "{} not set. Set it with: export {}='...'",
                    self.api_key_env, self.api_key_env
                ))
            })
    }

    /// Request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Agent loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Maximum tool dispatches per exchange.
    pub max_steps: usize,
    /// Retries of a model call after a retryable failure.
    pub max_retries: usize,
    /// Delay before the first retry, in milliseconds. Doubles on each retry.
    pub initial_backoff_ms: u64,
    /// Upper bound for a single retry delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Maximum number of prior turns sent to the model.
    pub max_context_turns: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: 5,
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            max_context_turns: 40,
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Sessions idle longer than this are evicted.
    pub idle_timeout_secs: u64,
    /// How often the eviction sweep runs.
    pub sweep_interval_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl SessionSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Open Library catalog settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Search endpoint.
    pub search_url: String,
    /// Base URL for cover images.
    pub covers_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum results returned by a catalog search.
    pub max_results: usize,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            search_url: "https://openlibrary.org/search.json".to_string(),
            covers_url: "https://covers.openlibrary.org/b".to_string(),
            timeout_secs: 5,
            max_results: 10,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<Settings>(&content)?
        } else {
            Settings::default()
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| BookMindError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that would otherwise only fail mid-exchange.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("model.api_base", &self.model.api_base),
            ("catalog.search_url", &self.catalog.search_url),
            ("catalog.covers_url", &self.catalog.covers_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| BookMindError::Config(format!("{} is not a valid URL: {}", name, e)))?;
        }

        if self.model.model.trim().is_empty() {
            return Err(BookMindError::Config("model.model must not be empty".to_string()));
        }
        if self.agent.max_context_turns == 0 {
            return Err(BookMindError::Config(
                "agent.max_context_turns must be at least 1".to_string(),
            ));
        }
        if self.agent.initial_backoff_ms > self.agent.max_backoff_ms {
            return Err(BookMindError::Config(
                "agent.initial_backoff_ms must not exceed agent.max_backoff_ms".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bookmind")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }
}
