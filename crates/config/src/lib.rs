//! Configuration loading, validation, and management for Nuggetizer.
//!
//! Loads configuration from `~/.nuggetizer/config.toml` (or an explicit
//! path) with environment variable overrides. Validates all settings at
//! startup. Backend credentials are resolved later, by the providers crate,
//! from the `[provider]` section plus the environment.

pub mod env;

use nuggetizer_core::{NuggetAssignMode, NuggetMode, NuggetScoreMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use env::{EnvSource, ProcessEnv};

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NuggetizerConfig {
    /// Model for every stage; overrides the per-stage models when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Window size for every stage; overrides the per-stage values when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<usize>,

    /// Cap for creator and scorer; overrides the per-stage values when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_nuggets: Option<usize>,

    /// Attach a trace to every emitted nugget
    #[serde(default = "default_true")]
    pub store_trace: bool,

    /// Copy model-reported reasoning onto emitted nuggets
    #[serde(default)]
    pub store_reasoning: bool,

    /// Directory holding `<template>.yaml` prompt overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates_dir: Option<PathBuf>,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub creator: CreatorConfig,

    #[serde(default)]
    pub scorer: ScorerConfig,

    #[serde(default)]
    pub assigner: AssignerConfig,

    #[serde(default)]
    pub runner: RunnerConfig,
}

fn default_true() -> bool {
    true
}
fn default_model() -> String {
    "gpt-4o".into()
}
fn default_window_size() -> usize {
    10
}
fn default_max_nuggets() -> usize {
    30
}

/// The backend identifiers accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[serde(alias = "open_ai")]
    OpenAi,
    Azure,
    OpenRouter,
    Vllm,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Azure => "azure",
            Self::OpenRouter => "openrouter",
            Self::Vllm => "vllm",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "azure" => Ok(Self::Azure),
            "openrouter" => Ok(Self::OpenRouter),
            "vllm" => Ok(Self::Vllm),
            other => Err(ConfigError::UnknownBackend(other.to_string())),
        }
    }
}

/// Caller-supplied connection settings. Anything left unset is filled from
/// the environment during backend resolution.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Explicit backend; highest resolution priority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,

    /// Credentials to rotate through on transport failures
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_keys: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    /// API version (Azure only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openrouter_api_key: Option<String>,

    #[serde(default)]
    pub use_azure: bool,

    #[serde(default)]
    pub use_openrouter: bool,

    #[serde(default)]
    pub use_vllm: bool,

    #[serde(default = "default_vllm_port")]
    pub vllm_port: u16,

    /// Per-call timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Transport attempts per generation call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between failed attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_vllm_port() -> u16 {
    8000
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_attempts() -> u32 {
    5
}
fn default_retry_delay_ms() -> u64 {
    100
}
fn default_max_output_tokens() -> u32 {
    4096
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            backend: None,
            api_keys: Vec::new(),
            api_base: None,
            api_version: None,
            openrouter_api_key: None,
            use_azure: false,
            use_openrouter: false,
            use_vllm: false,
            vllm_port: default_vllm_port(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// Redact secrets for Debug output.
fn redact(keys: &[String]) -> String {
    format!("[{} REDACTED]", keys.len())
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("backend", &self.backend)
            .field("api_keys", &redact(&self.api_keys))
            .field("api_base", &self.api_base)
            .field("api_version", &self.api_version)
            .field(
                "openrouter_api_key",
                &self.openrouter_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("use_azure", &self.use_azure)
            .field("use_openrouter", &self.use_openrouter)
            .field("use_vllm", &self.use_vllm)
            .field("vllm_port", &self.vllm_port)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatorConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default = "default_max_nuggets")]
    pub max_nuggets: usize,

    #[serde(default)]
    pub mode: NuggetMode,
}

impl Default for CreatorConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            window_size: default_window_size(),
            max_nuggets: default_max_nuggets(),
            mode: NuggetMode::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default = "default_max_nuggets")]
    pub max_nuggets: usize,

    #[serde(default)]
    pub mode: NuggetScoreMode,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            window_size: default_window_size(),
            max_nuggets: default_max_nuggets(),
            mode: NuggetScoreMode::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignerConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default)]
    pub mode: NuggetAssignMode,
}

impl Default for AssignerConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            window_size: default_window_size(),
            mode: NuggetAssignMode::default(),
        }
    }
}

/// Parse-retry behavior shared by all windowed stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Failed attempts allowed per window before falling back
    #[serde(default = "default_parse_retry_budget")]
    pub parse_retry_budget: u32,

    #[serde(default)]
    pub initial_temperature: f32,

    /// Temperature used for every retry after the first failure
    #[serde(default = "default_retry_temperature")]
    pub retry_temperature: f32,
}

fn default_parse_retry_budget() -> u32 {
    500
}
fn default_retry_temperature() -> f32 {
    0.2
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            parse_retry_budget: default_parse_retry_budget(),
            initial_temperature: 0.0,
            retry_temperature: default_retry_temperature(),
        }
    }
}

impl NuggetizerConfig {
    /// Load configuration from `path`, or from the default location when
    /// `path` is `None`, then apply overrides from the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(path.unwrap_or(&default_path))?;
        config.apply_env(&ProcessEnv);
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

    /// Apply environment overrides.
    pub fn apply_env(&mut self, env: &dyn EnvSource) {
        if let Some(model) = env.var(env::NUGGETIZER_MODEL) {
            self.model = Some(model);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".nuggetizer")
    }

    /// Model used by the creator, after the global override.
    pub fn creator_model(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.creator.model)
    }

    pub fn scorer_model(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.scorer.model)
    }

    pub fn assigner_model(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.assigner.model)
    }

    pub fn creator_window_size(&self) -> usize {
        self.window_size.unwrap_or(self.creator.window_size)
    }

    pub fn scorer_window_size(&self) -> usize {
        self.window_size.unwrap_or(self.scorer.window_size)
    }

    pub fn assigner_window_size(&self) -> usize {
        self.window_size.unwrap_or(self.assigner.window_size)
    }

    pub fn creator_max_nuggets(&self) -> usize {
        self.max_nuggets.unwrap_or(self.creator.max_nuggets)
    }

    pub fn scorer_max_nuggets(&self) -> usize {
        self.max_nuggets.unwrap_or(self.scorer.max_nuggets)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let windows = [
            self.creator_window_size(),
            self.scorer_window_size(),
            self.assigner_window_size(),
        ];
        if windows.contains(&0) {
            return Err(ConfigError::ValidationError(
                "window sizes must be greater than 0".into(),
            ));
        }

        if self.creator_max_nuggets() == 0 || self.scorer_max_nuggets() == 0 {
            return Err(ConfigError::ValidationError(
                "max_nuggets must be greater than 0".into(),
            ));
        }

        for t in [self.runner.initial_temperature, self.runner.retry_temperature] {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(
                    "temperatures must be between 0.0 and 2.0".into(),
                ));
            }
        }

        if self.runner.parse_retry_budget == 0 {
            return Err(ConfigError::ValidationError(
                "runner.parse_retry_budget must be at least 1".into(),
            ));
        }

        if self.provider.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "provider.max_attempts must be at least 1".into(),
            ));
        }

        if self.provider.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "provider.timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for NuggetizerConfig {
    fn default() -> Self {
        Self {
            model: None,
            window_size: None,
            max_nuggets: None,
            store_trace: true,
            store_reasoning: false,
            templates_dir: None,
            provider: ProviderConfig::default(),
            creator: CreatorConfig::default(),
            scorer: ScorerConfig::default(),
            assigner: AssignerConfig::default(),
            runner: RunnerConfig::default(),
        }
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

    #[error("Unknown backend '{0}' (expected openai, azure, openrouter or vllm)")]
    UnknownBackend(String),

    /// A backend was selected but one of its required settings is absent.
    #[error("{backend} backend requires {setting}, which is not set")]
    MissingSetting { backend: BackendKind, setting: String },

    #[error(
        "No valid API key found. Provide api_keys, set OPEN_AI_API_KEY / OPENAI_API_KEY or \
         OPENROUTER_API_KEY, configure Azure (AZURE_OPENAI_API_KEY, AZURE_OPENAI_API_BASE, \
         AZURE_OPENAI_API_VERSION), or enable use_vllm"
    )]
    NoCredentials,
}

impl From<ConfigError> for nuggetizer_core::Error {
    fn from(err: ConfigError) -> Self {
        nuggetizer_core::Error::config(err.to_string())
    }
}
