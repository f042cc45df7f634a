//! Engine configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via STATECRAFT_CONFIG or `from_file`)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "STATECRAFT_CONFIG";

/// Engine and loader configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding definition documents.
    pub definitions_path: PathBuf,
    /// State field used when a definition does not name one.
    pub default_state_field: String,
    /// Lifecycle notifications.
    pub events: EventsConfig,
    /// Transition history.
    pub history: HistoryConfig,
    /// Guard/action resolution.
    pub resolver: ResolverConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            definitions_path: PathBuf::from("./state_machines"),
            default_state_field: "state".to_string(),
            events: EventsConfig::default(),
            history: HistoryConfig::default(),
            resolver: ResolverConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Loads from `path` when given (defaults otherwise), then applies environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: EngineConfig = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from environment variables only.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("STATECRAFT_DEFINITIONS_PATH") {
            self.definitions_path = PathBuf::from(path);
        }

        if let Ok(field) = std::env::var("STATECRAFT_DEFAULT_STATE_FIELD") {
            if !field.is_empty() {
                self.default_state_field = field;
            }
        }

        self.events.apply_env_overrides();
        self.history.apply_env_overrides();
        self.resolver.apply_env_overrides();
    }

    /// Checks values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_state_field.trim().is_empty() {
            return Err(ConfigError::Validation(
                "default_state_field must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Lifecycle notification configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Publish `Transitioning`/`Transitioned` notifications.
    pub enabled: bool,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl EventsConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("STATECRAFT_EVENTS_ENABLED") {
            self.enabled = parse_flag(&enabled);
        }
    }
}

/// History configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Record transitions on subjects that expose a history sink.
    pub enabled: bool,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl HistoryConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("STATECRAFT_HISTORY_ENABLED") {
            self.enabled = parse_flag(&enabled);
        }
    }
}

/// Default namespaces tried for bare guard/action identifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub guard_namespace: String,
    pub action_namespace: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            guard_namespace: "guards".to_string(),
            action_namespace: "actions".to_string(),
        }
    }
}

impl ResolverConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(ns) = std::env::var("STATECRAFT_GUARD_NAMESPACE") {
            self.guard_namespace = ns;
        }
        if let Ok(ns) = std::env::var("STATECRAFT_ACTION_NAMESPACE") {
            self.action_namespace = ns;
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    Parse(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}
