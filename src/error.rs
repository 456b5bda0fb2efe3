//! Error types for the Satellite receptor worker.
//!
//! The run engine itself never surfaces errors to its caller (failures become
//! protocol messages), so this type is used at the edges: loading configuration
//! and decoding directives.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the worker.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Directive Errors
    // ========================================================================
    /// A directive payload is missing a field or has the wrong shape.
    #[error("Invalid '{directive}' payload: {message}")]
    InvalidPayload {
        /// Directive name
        directive: String,
        /// Error message
        message: String,
    },

    /// Directive name is not one the worker understands.
    #[error("Unknown directive '{0}'")]
    UnknownDirective(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    // ========================================================================
    // IO / Serialization Errors
    // ========================================================================
    /// IO error while reading a configuration file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Error {
    /// Creates a new invalid payload error.
    pub fn invalid_payload(directive: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            directive: directive.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid config error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns the exit code used by the CLI when this error is fatal.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidConfig { .. }
            | Error::ConfigNotFound(_)
            | Error::Io(_)
            | Error::JsonParse(_)
            | Error::YamlParse(_)
            | Error::TomlParse(_) => 5,
            _ => 1,
        }
    }
}
