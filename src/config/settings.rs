//! TOML-based configuration for Quantbridge.
//!
//! Supports a config file (quantbridge.toml) with environment variable
//! expansion in paths and URLs.
//!
//! Example configuration:
//! ```toml
//! [client]
//! worker_path = "${HOME}/bin/quantbridge-worker"
//! engine_url = "builtin:imagequant"
//! init_timeout_ms = 10000
//! operation_timeout_ms = 30000
//!
//! [logging]
//! filter = "quantbridge=debug"
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::{ClientConfig, DEFAULT_INIT_TIMEOUT_MS, DEFAULT_OPERATION_TIMEOUT_MS};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "QUANTBRIDGE_CONFIG";

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Client and worker settings.
    pub client: ClientSettings,

    /// Logging settings.
    pub logging: LogSettings,
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Path to the worker executable. Unset runs the worker in-process.
    pub worker_path: Option<String>,

    /// Engine module URL override (supports ${ENV_VAR} expansion).
    pub engine_url: Option<String>,

    /// Ready-handshake timeout in milliseconds.
    pub init_timeout_ms: u64,

    /// Per-operation timeout in milliseconds.
    pub operation_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            worker_path: None,
            engine_url: None,
            init_timeout_ms: DEFAULT_INIT_TIMEOUT_MS,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
        }
    }
}

impl ClientSettings {
    /// Build a [`ClientConfig`], expanding environment variables.
    pub fn to_client_config(&self) -> Result<ClientConfig, SettingsError> {
        if self.init_timeout_ms == 0 {
            return Err(SettingsError::InvalidConfig(
                "init_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.operation_timeout_ms == 0 {
            return Err(SettingsError::InvalidConfig(
                "operation_timeout_ms must be greater than 0".to_string(),
            ));
        }

        let mut config = ClientConfig::default()
            .with_init_timeout(Duration::from_millis(self.init_timeout_ms))
            .with_operation_timeout(Duration::from_millis(self.operation_timeout_ms));

        if let Some(path) = &self.worker_path {
            config = config.with_worker_url(expand_env_vars(path)?);
        }
        if let Some(url) = &self.engine_url {
            config = config.with_engine_url(expand_env_vars(url)?);
        }

        Ok(config)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directives. `RUST_LOG` takes precedence.
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `QUANTBRIDGE_CONFIG`
    /// 2. `./quantbridge.toml`
    /// 3. `~/.config/quantbridge/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("quantbridge.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("quantbridge").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax. A lone `$` is kept as is.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                var_name.push(ch);
            }
            if !closed {
                return Err(SettingsError::InvalidConfig(format!(
                    "unterminated variable reference in '{}'",
                    s
                )));
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    var_name.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            if var_name.is_empty() {
                result.push('$');
                continue;
            }
        }

        let value =
            env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
        result.push_str(&value);
    }

    Ok(result)
}
