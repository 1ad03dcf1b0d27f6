//! Configuration sources: JSON strings, files, and environment overrides.

use std::env;
use std::fs;
use std::path::Path;

use swarmhook_telemetry::LogFormat;
use tracing::{debug, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::model::HostConfig;

/// Environment variable overriding `logging.level`.
pub const ENV_LOG_LEVEL: &str = "SWARMHOOK_LOG_LEVEL";
/// Environment variable overriding `logging.format`.
pub const ENV_LOG_FORMAT: &str = "SWARMHOOK_LOG_FORMAT";

impl HostConfig {
    /// Parse and validate a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed documents and
    /// [`ConfigError::InvalidField`] when validation fails.
    pub fn from_json_str(raw: &str) -> ConfigResult<Self> {
        let config: Self =
            serde_json::from_str(raw).map_err(|source| ConfigError::Parse { source })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise the errors of
    /// [`HostConfig::from_json_str`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded host configuration");
        Self::from_json_str(&raw)
    }

    /// Apply `SWARMHOOK_LOG_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] if an override produces an invalid document.
    pub fn apply_env_overrides(&mut self) -> ConfigResult<()> {
        self.apply_overrides_from(|key| env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// The configuration is only replaced once the overridden document validates; on error
    /// it is left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] for an unknown format or an invalid level.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut next = self.clone();

        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            next.logging.level = level.trim().to_ascii_lowercase();
        }

        if let Some(raw) = lookup(ENV_LOG_FORMAT) {
            next.logging.format = raw.parse::<LogFormat>().map_err(|err| {
                warn!(error = %err, value = %raw, "rejected log format override");
                ConfigError::InvalidField {
                    section: "logging",
                    field: "format",
                    value: Some(raw.clone()),
                    reason: "expected json or pretty",
                }
            })?;
        }

        next.validate()?;
        *self = next;
        Ok(())
    }
}
