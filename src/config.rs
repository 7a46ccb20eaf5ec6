/*!
 * Application configuration: TOML file, defaults, environment overrides
 */

use crate::error::{AppError, Result};
use pagepilot_scheduler::{AutopilotSettings, SchedulerPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_GRAPH_API_URL: &str = "GRAPH_API_URL";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_API_URL: &str = "OPENAI_API_URL";
pub const ENV_LOG: &str = "PAGEPILOT_LOG";

fn default_database_url() -> String {
    "pagepilot.db".to_string()
}

fn default_graph_api_url() -> String {
    "https://graph.facebook.com/v18.0".to_string()
}

fn default_llm_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_timeout_s() -> u64 {
    30
}

/// Top-level configuration, loaded from `pagepilot.toml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// SQLite path or `sqlite:` URL
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default)]
    pub log_level: LogLevel,

    /// Write JSON logs here instead of stdout
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default)]
    pub verbose: bool,

    #[serde(default)]
    pub scheduler: SchedulerPolicy,

    #[serde(default)]
    pub facebook: FacebookConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub autopilot: AutopilotSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            log_level: LogLevel::default(),
            log_file: None,
            verbose: false,
            scheduler: SchedulerPolicy::default(),
            facebook: FacebookConfig::default(),
            llm: LlmConfig::default(),
            autopilot: AutopilotSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| AppError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|source| AppError::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Load from `path` if given, else defaults; then apply the process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment variables read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = get(ENV_DATABASE_URL) {
            self.database_url = url;
        }
        if let Some(url) = get(ENV_GRAPH_API_URL) {
            self.facebook.api_url = url;
        }
        if let Some(key) = get(ENV_OPENAI_API_KEY) {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = get(ENV_OPENAI_API_URL) {
            self.llm.api_url = url;
        }
        if let Some(level) = get(ENV_LOG).and_then(|l| l.parse().ok()) {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler
            .validate()
            .map_err(|msg| AppError::Config(format!("[scheduler] {}", msg)))?;
        if self.database_url.trim().is_empty() {
            return Err(AppError::Config("database_url must not be empty".into()));
        }
        if self.facebook.timeout_s == 0 || self.llm.timeout_s == 0 {
            return Err(AppError::Config("request timeouts must be at least 1s".into()));
        }
        Ok(())
    }
}

/// Facebook Graph API settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FacebookConfig {
    #[serde(default = "default_graph_api_url")]
    pub api_url: String,

    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,
}

impl Default for FacebookConfig {
    fn default() -> Self {
        Self {
            api_url: default_graph_api_url(),
            timeout_s: default_timeout_s(),
        }
    }
}

impl FacebookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_s)
    }
}

/// Chat-completion provider settings
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmConfig {
    #[serde(default = "default_llm_api_url")]
    pub api_url: String,

    #[serde(default = "default_llm_model")]
    pub model: String,

    #[serde(default = "default_timeout_s")]
    pub timeout_s: u64,

    /// Usually supplied through `OPENAI_API_KEY` rather than the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: default_llm_api_url(),
            model: default_llm_model(),
            timeout_s: default_timeout_s(),
            api_key: None,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_s)
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("timeout_s", &self.timeout_s)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(AppError::Config(format!("Unknown log level: {}", other))),
        }
    }
}
