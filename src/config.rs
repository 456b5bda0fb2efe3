//! Worker configuration.
//!
//! Loaded from, in order of increasing precedence:
//! - Default values
//! - The first configuration file found among an explicit path,
//!   `$RECEPTOR_SATELLITE_CONFIG`, `/etc/receptor-satellite/config.toml` and
//!   `~/.config/receptor-satellite/config.toml`
//! - Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::satellite::SatelliteClientConfig;
use crate::verifier::{CommandVerifier, DEFAULT_VERIFIER_ARGS, DEFAULT_VERIFIER_PROGRAM};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "RECEPTOR_SATELLITE_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Satellite connection settings
    pub satellite: SatelliteSettings,

    /// Playbook verifier settings
    pub verifier: VerifierSettings,
}

/// Satellite connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SatelliteSettings {
    /// Base URL of the Satellite instance
    pub url: String,
    /// API username
    pub username: String,
    /// API password
    pub password: String,
    /// Verify TLS certificates
    pub validate_certs: bool,
    /// Extra CA bundle to trust
    pub ca_file: Option<PathBuf>,
    /// Request timeout in seconds
    pub timeout: u64,
}

impl Default for SatelliteSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            validate_certs: true,
            ca_file: None,
            timeout: 60,
        }
    }
}

/// Playbook verifier settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierSettings {
    /// Program checking playbook signatures
    pub program: PathBuf,
    /// Arguments passed to the program
    pub args: Vec<String>,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_VERIFIER_PROGRAM),
            args: DEFAULT_VERIFIER_ARGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = match Self::get_config_paths(config_path)
            .into_iter()
            .find(|path| path.exists())
        {
            Some(path) => Self::from_file(&path)?,
            None => {
                if let Some(path) = config_path {
                    return Err(Error::ConfigNotFound(path.clone()));
                }
                WorkerConfig::default()
            }
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Get the list of configuration file paths to check
    fn get_config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        if let Some(path) = explicit_path {
            return vec![path.clone()];
        }

        let mut paths = Vec::new();
        if let Ok(env_config) = std::env::var(CONFIG_ENV) {
            paths.push(PathBuf::from(env_config));
        }

        paths.push(PathBuf::from("/etc/receptor-satellite/config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("receptor-satellite/config.toml"));
        }

        paths
    }

    /// Parse a configuration file, picking the format from its extension
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: WorkerConfig = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            _ => toml::from_str(&content).or_else(|_| serde_yaml::from_str(&content))?,
        };

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("RECEPTOR_SATELLITE_URL") {
            self.satellite.url = url;
        }

        if let Ok(username) = std::env::var("RECEPTOR_SATELLITE_USERNAME") {
            self.satellite.username = username;
        }

        if let Ok(password) = std::env::var("RECEPTOR_SATELLITE_PASSWORD") {
            self.satellite.password = password;
        }

        if let Ok(value) = std::env::var("RECEPTOR_SATELLITE_VALIDATE_CERTS") {
            match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.satellite.validate_certs = true,
                "0" | "false" | "no" | "off" => self.satellite.validate_certs = false,
                _ => tracing::warn!(
                    "Ignoring RECEPTOR_SATELLITE_VALIDATE_CERTS value '{}'",
                    value
                ),
            }
        }

        if let Ok(program) = std::env::var("RECEPTOR_SATELLITE_VERIFIER") {
            self.verifier.program = PathBuf::from(program);
        }
    }

    /// Checks the settings a worker cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.satellite.url.trim().is_empty() {
            return Err(Error::invalid_config(
                "satellite.url",
                "must not be empty",
            ));
        }
        url::Url::parse(&self.satellite.url)
            .map_err(|e| Error::invalid_config("satellite.url", e.to_string()))?;
        if self.satellite.timeout == 0 {
            return Err(Error::invalid_config(
                "satellite.timeout",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Settings for the Satellite HTTP client.
    pub fn client_config(&self) -> SatelliteClientConfig {
        SatelliteClientConfig {
            url: self.satellite.url.clone(),
            username: self.satellite.username.clone(),
            password: self.satellite.password.clone(),
            validate_certs: self.satellite.validate_certs,
            ca_file: self.satellite.ca_file.clone(),
            timeout: Duration::from_secs(self.satellite.timeout),
        }
    }

    /// Playbook verifier described by this configuration.
    pub fn verifier(&self) -> CommandVerifier {
        CommandVerifier::new(&self.verifier.program).with_args(self.verifier.args.iter().cloned())
    }
}
