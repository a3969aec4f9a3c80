//! Configuration loading, validation, and logging setup for Cairn.
//!
//! Loads configuration from `~/.cairn/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.cairn/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model selection
    #[serde(default)]
    pub model: ModelConfig,

    /// Context assembly and token budget
    #[serde(default)]
    pub context: ContextConfig,

    /// Tool routing
    #[serde(default)]
    pub router: RouterConfig,

    /// Conversation loop
    #[serde(default)]
    pub agent: AgentConfig,

    /// Workspace registry
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Main generation model
    #[serde(default = "default_model")]
    pub model: String,

    /// Cheaper model for tag generation and summaries
    #[serde(default = "default_utility_model")]
    pub utility_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_model() -> String {
    "claude-sonnet-4".into()
}
fn default_utility_model() -> String {
    "claude-haiku-4".into()
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            utility_model: default_utility_model(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Total prompt capacity in tokens
    #[serde(default = "default_capacity_tokens")]
    pub capacity_tokens: usize,

    /// Cap on merged recall results
    #[serde(default = "default_recall_limit")]
    pub recall_limit: usize,

    /// Minimum cosine similarity for vector recall
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,

    /// Cap on vector recall hits before merging
    #[serde(default = "default_vector_limit")]
    pub vector_limit: usize,

    /// Target size of a summarized section relative to its budget
    #[serde(default = "default_summary_target_ratio")]
    pub summary_target_ratio: f32,
}

fn default_capacity_tokens() -> usize {
    8192
}
fn default_recall_limit() -> usize {
    10
}
fn default_min_similarity() -> f32 {
    0.4
}
fn default_vector_limit() -> usize {
    10
}
fn default_summary_target_ratio() -> f32 {
    0.5
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            capacity_tokens: default_capacity_tokens(),
            recall_limit: default_recall_limit(),
            min_similarity: default_min_similarity(),
            vector_limit: default_vector_limit(),
            summary_target_ratio: default_summary_target_ratio(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Timeout for a remote client round-trip
    #[serde(default = "default_remote_timeout_secs")]
    pub remote_timeout_secs: u64,

    /// Identical calls allowed inside the window before the next is rejected
    #[serde(default = "default_loop_threshold")]
    pub loop_threshold: usize,

    /// Number of recent calls remembered per session
    #[serde(default = "default_loop_window")]
    pub loop_window: usize,

    /// How long to wait for an operator decision
    #[serde(default = "default_approval_timeout_secs")]
    pub approval_timeout_secs: u64,
}

fn default_remote_timeout_secs() -> u64 {
    60
}
fn default_loop_threshold() -> usize {
    3
}
fn default_loop_window() -> usize {
    10
}
fn default_approval_timeout_secs() -> u64 {
    300
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            remote_timeout_secs: default_remote_timeout_secs(),
            loop_threshold: default_loop_threshold(),
            loop_window: default_loop_window(),
            approval_timeout_secs: default_approval_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Generations per user turn before the loop gives up
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Pull the next queued job when a turn ends without tool calls
    #[serde(default)]
    pub auto_continue: bool,
}

fn default_max_turns() -> u32 {
    10
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            auto_continue: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Parent of every session-private sandbox
    #[serde(default = "default_sessions_root")]
    pub sessions_root: PathBuf,
}

fn default_sessions_root() -> PathBuf {
    AppConfig::config_dir().join("sessions")
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            sessions_root: default_sessions_root(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.cairn/config.toml).
    ///
    /// Environment variables override file values:
    /// - `CAIRN_MODEL`
    /// - `CAIRN_UTILITY_MODEL`
    /// - `CAIRN_SESSIONS_ROOT`
    /// - `CAIRN_LOG`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("CAIRN_MODEL") {
            self.model.model = model;
        }
        if let Some(model) = lookup("CAIRN_UTILITY_MODEL") {
            self.model.utility_model = model;
        }
        if let Some(root) = lookup("CAIRN_SESSIONS_ROOT") {
            self.workspace.sessions_root = PathBuf::from(root);
        }
        if let Some(level) = lookup("CAIRN_LOG") {
            self.logging.level = level;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".cairn")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.temperature < 0.0 || self.model.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.context.capacity_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "context.capacity_tokens must be > 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.context.min_similarity) {
            return Err(ConfigError::ValidationError(
                "context.min_similarity must be between 0.0 and 1.0".into(),
            ));
        }

        if self.context.summary_target_ratio <= 0.0 || self.context.summary_target_ratio > 1.0 {
            return Err(ConfigError::ValidationError(
                "context.summary_target_ratio must be in (0.0, 1.0]".into(),
            ));
        }

        if self.agent.max_turns == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_turns must be > 0".into(),
            ));
        }

        if self.router.loop_threshold == 0 || self.router.loop_window < self.router.loop_threshold
        {
            return Err(ConfigError::ValidationError(
                "router.loop_threshold must be > 0 and not exceed router.loop_window".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Calling this more than
/// once is harmless; only the first call installs a subscriber.
pub fn init_logging(config: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let result = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_turns, 10);
        assert_eq!(config.router.loop_threshold, 3);
        assert!((config.context.min_similarity - 0.4).abs() < f32::EPSILON);
        assert!(!config.agent.auto_continue);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model.model, config.model.model);
        assert_eq!(parsed.context.capacity_tokens, config.context.capacity_tokens);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[agent]
max_turns = 4
auto_continue = true

[context]
capacity_tokens = 2048
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.agent.max_turns, 4);
        assert!(config.agent.auto_continue);
        assert_eq!(config.context.capacity_tokens, 2048);
        assert_eq!(config.context.recall_limit, 10);
        assert_eq!(config.router.remote_timeout_secs, 60);
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[agent\nmax_turns = ").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn zero_max_turns_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_turns = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_similarity_rejected() {
        let mut config = AppConfig::default();
        config.context.min_similarity = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn loop_threshold_must_fit_window() {
        let mut config = AppConfig::default();
        config.router.loop_window = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CAIRN_MODEL", "big-model"),
            ("CAIRN_SESSIONS_ROOT", "/srv/sessions"),
        ]);
        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.model.model, "big-model");
        assert_eq!(config.workspace.sessions_root, PathBuf::from("/srv/sessions"));
        assert_eq!(config.model.utility_model, default_utility_model());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().agent.max_turns, 10);
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("max_turns"));
        assert!(toml_str.contains("capacity_tokens"));
    }

    #[test]
    fn init_logging_twice_is_harmless() {
        init_logging(&LoggingConfig::default());
        init_logging(&LoggingConfig {
            level: "debug".into(),
            json: true,
        });
    }
}
