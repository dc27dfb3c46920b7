//! Manager configuration via `txscope.toml`
//!
//! A config file supplies a manager's default settings. Values are kept as
//! strings and validated when converted, so a bad value is reported with the
//! file it came from rather than as a generic parse failure.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use txscope_core::{ContextKey, Propagation, Settings};

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "txscope.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read or written
    #[error("config file '{path}': {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or type error
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Serialization failed
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A field has a value outside its domain
    #[error("invalid {field} '{value}': {reason}")]
    InvalidValue {
        /// Field name
        field: &'static str,
        /// Offending value
        value: String,
        /// What was expected
        reason: String,
    },
}

/// Manager configuration loaded from `txscope.toml`
///
/// # Example
///
/// ```toml
/// propagation = "nested"
/// cancelable = false
/// timeout_ms = 2500
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Default propagation mode (`"required"`, `"requires_new"`, ...)
    #[serde(default = "default_propagation_str")]
    pub propagation: String,
    /// Whether transaction scopes follow the caller's cancellation
    #[serde(default = "default_true")]
    pub cancelable: bool,
    /// Whether nested transactions prefer savepoints
    #[serde(default = "default_true")]
    pub prefer_savepoint: bool,
    /// Transaction timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Registry key as a UUID; the default key when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctx_key: Option<String>,
}

fn default_propagation_str() -> String {
    Propagation::default().as_str().to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            propagation: default_propagation_str(),
            cancelable: true,
            prefer_savepoint: true,
            timeout_ms: None,
            ctx_key: None,
        }
    }
}

impl ManagerConfig {
    /// Returns the default config file content with comments
    pub fn default_toml() -> &'static str {
        r#"# txscope manager configuration
#
# Propagation mode used when a call does not pass its own settings:
#   required | requires_new | nested | mandatory | never | not_supported | supports
propagation = "required"

# Follow the caller's cancellation and deadline (default: true).
# When false, transactions finish even if the caller gives up.
cancelable = true

# Ask adapters for savepoints on nested transactions (default: true)
prefer_savepoint = true

# Bound every transaction's lifetime (milliseconds, default: none)
# timeout_ms = 5000

# Registry key (UUID). Managers coordinating different resources need
# different keys; managers sharing a key join each other's transactions.
# ctx_key = "6f1c2f4e-8d0a-4c61-9a53-2b1f0c7d9e10"
"#
    }

    /// Parse and validate config from TOML text
    ///
    /// # Errors
    /// Parse errors and invalid values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ManagerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate config from a file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Write the default config file if it does not already exist
    pub fn write_default_if_missing(path: &Path) -> Result<(), ConfigError> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to `path`
    pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parsed propagation mode
    pub fn propagation_mode(&self) -> Result<Propagation, ConfigError> {
        self.propagation
            .parse()
            .map_err(|reason| ConfigError::InvalidValue {
                field: "propagation",
                value: self.propagation.clone(),
                reason,
            })
    }

    /// Parsed registry key
    pub fn context_key(&self) -> Result<ContextKey, ConfigError> {
        match &self.ctx_key {
            None => Ok(ContextKey::DEFAULT),
            Some(raw) => ContextKey::from_string(raw).ok_or_else(|| ConfigError::InvalidValue {
                field: "ctx_key",
                value: raw.clone(),
                reason: "expected a UUID".to_string(),
            }),
        }
    }

    /// Check every field
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.propagation_mode()?;
        self.context_key()?;
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "timeout_ms",
                value: "0".to_string(),
                reason: "must be positive; omit it for no timeout".to_string(),
            });
        }
        Ok(())
    }

    /// Convert to manager settings
    pub fn to_settings(&self) -> Result<Settings, ConfigError> {
        let mut settings = Settings::new()
            .with_propagation(self.propagation_mode()?)
            .with_cancelable(self.cancelable)
            .with_prefer_savepoint(self.prefer_savepoint)
            .with_ctx_key(self.context_key()?);
        if let Some(ms) = self.timeout_ms {
            settings = settings.with_timeout(Duration::from_millis(ms));
        }
        Ok(settings)
    }
}
