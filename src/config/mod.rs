//! Configuration module for Quantbridge.
//!
//! Handles the TOML settings file and environment variable expansion.

mod settings;

pub use settings::{expand_env_vars, ClientSettings, LogSettings, Settings, SettingsError};
