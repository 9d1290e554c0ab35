//! Configuration management for docguard
//!
//! This module provides environment-based configuration with defaults,
//! TOML file loading and validation.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

use crate::provision::FailurePolicy;
use humantime_serde::re::humantime::parse_duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Document store connection
    pub store: StoreConfig,

    /// Permission provisioning behavior
    pub permissions: PermissionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Document store connection settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `http` or `https`
    pub protocol: String,

    pub host: String,

    pub port: u16,

    /// Admin user the provisioner authenticates as
    pub username: String,

    pub password: String,

    /// Upper bound for a single store request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

/// Permission provisioning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// Store username that stands for "anyone"
    pub public_user: String,

    /// What provision does when permission artifacts fail to apply
    pub provision_failure_policy: FailurePolicy,

    /// What update does when permission artifacts fail to apply
    pub update_failure_policy: FailurePolicy,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 5984,
            username: "admin".to_string(),
            password: String::new(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl StoreConfig {
    /// Base URL of the store, without credentials
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            public_user: "public".to_string(),
            provision_failure_policy: FailurePolicy::BestEffort,
            update_failure_policy: FailurePolicy::BestEffort,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_target: true,
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("{raw:?}: {e}"),
            }),
        None => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: DOCGUARD_<SECTION>_<KEY>
    /// Example: DOCGUARD_STORE_HOST=couch.internal
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Store config
        if let Some(protocol) = lookup("DOCGUARD_STORE_PROTOCOL") {
            config.store.protocol = protocol;
        }
        if let Some(host) = lookup("DOCGUARD_STORE_HOST") {
            config.store.host = host;
        }
        if let Some(port) = parse_var(&lookup, "DOCGUARD_STORE_PORT")? {
            config.store.port = port;
        }
        if let Some(username) = lookup("DOCGUARD_STORE_USER") {
            config.store.username = username;
        }
        if let Some(password) = lookup("DOCGUARD_STORE_PASS") {
            config.store.password = password;
        }
        if let Some(timeout) = lookup("DOCGUARD_STORE_REQUEST_TIMEOUT") {
            config.store.request_timeout = parse_duration(&timeout).map_err(|e| {
                ConfigError::InvalidValue {
                    key: "DOCGUARD_STORE_REQUEST_TIMEOUT".to_string(),
                    reason: format!("{timeout:?}: {e}"),
                }
            })?;
        }

        // Permission config
        if let Some(public_user) = lookup("DOCGUARD_PUBLIC_USER") {
            config.permissions.public_user = public_user;
        }
        if let Some(policy) = parse_var(&lookup, "DOCGUARD_PROVISION_FAILURE_POLICY")? {
            config.permissions.provision_failure_policy = policy;
        }
        if let Some(policy) = parse_var(&lookup, "DOCGUARD_UPDATE_FAILURE_POLICY")? {
            config.permissions.update_failure_policy = policy;
        }

        // Logging config
        if let Some(level) = lookup("DOCGUARD_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(json) = parse_var(&lookup, "DOCGUARD_LOG_JSON")? {
            config.logging.json_format = json;
        }

        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Lowercase the case-insensitive settings (store protocol, log level)
    pub fn normalize(&mut self) {
        self.store.protocol.make_ascii_lowercase();
        self.logging.level.make_ascii_lowercase();
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate store config
        if !matches!(self.store.protocol.as_str(), "http" | "https") {
            return Err(ConfigError::ValidationFailed(format!(
                "Unsupported store protocol: {}",
                self.store.protocol
            )));
        }

        if self.store.host.is_empty() {
            return Err(ConfigError::ValidationFailed("store host must not be empty".to_string()));
        }

        if self.store.port == 0 {
            return Err(ConfigError::ValidationFailed(
                "store port must be greater than 0".to_string(),
            ));
        }

        if self.store.request_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        // Validate permission config
        let public_user = &self.permissions.public_user;
        if public_user.is_empty() || public_user.chars().any(char::is_control) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid public user: {public_user:?}"
            )));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(())
    }
}
