//! Configuration loading traits and types.
//!
//! Deployment files are TOML. Any `serde`-deserializable struct can be loaded
//! through the [`ConfigLoader`] blanket implementation; the full deployment
//! layout lives in [`crate::descriptor`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use ferrule_common::config::{ConfigError, ConfigLoader};
//! use ferrule_common::descriptor::DeploymentConfig;
//! use ferrule_common::logging::init_tracing;
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let deployment = DeploymentConfig::load(Path::new("deployment.toml"))?;
//!     deployment.validate()?;
//!     init_tracing(&deployment.shared);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::consts::{DEFAULT_TIMEOUT_SECS, TIMEOUT_SECS_MAX};

/// Failure to load or validate a deployment.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("deployment file not found")]
    FileNotFound,

    /// Unreadable file, bad TOML, unknown field or unknown enum value.
    #[error("malformed deployment: {0}")]
    ParseError(String),

    /// Well-formed but inconsistent (duplicates, disallowed attribute, bounds).
    #[error("invalid deployment: {0}")]
    ValidationError(String),
}

/// Log level for engine logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// State-machine transitions of every invocation.
    Trace,
    /// Suspend/begin/commit decisions.
    Debug,
    /// General information about engine operation.
    #[default]
    Info,
    /// Swallowed cleanup failures and tolerated discard failures.
    Warn,
    /// System failures only.
    Error,
}

impl LogLevel {
    /// Equivalent `tracing` level.
    pub const fn as_tracing(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

/// Common configuration fields shared by every deployment.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "orders-container"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Container instance identifier.
    pub service_name: String,

    /// Emit JSON log lines instead of the compact format.
    #[serde(default)]
    pub json_logs: bool,
}

impl SharedConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "shared.service_name must name the container".to_string(),
            ));
        }
        Ok(())
    }
}

/// Engine-wide settings.
///
/// ```toml
/// [engine]
/// default_timeout_secs = 300
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Timeout for container-started transactions whose method configures none.
    /// Zero leaves the transaction manager default in place.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_timeout_secs > TIMEOUT_SECS_MAX {
            return Err(ConfigError::ValidationError(format!(
                "default_timeout_secs {} out of range [0, {}]",
                self.default_timeout_secs, TIMEOUT_SECS_MAX
            )));
        }
        Ok(())
    }

    /// Default timeout, `None` when the manager default applies.
    pub fn default_timeout(&self) -> Option<Duration> {
        (self.default_timeout_secs > 0).then(|| Duration::from_secs(self.default_timeout_secs))
    }
}

/// TOML loading for any deserializable deployment section.
///
/// A missing file is `FileNotFound`; every other read or syntax problem is a
/// `ParseError`. Callers run semantic validation themselves.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::FileNotFound);
            }
            Err(e) => {
                return Err(ConfigError::ParseError(format!("{}: {e}", path.display())));
            }
        };
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation: any serde-deserializable struct can be loaded.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
