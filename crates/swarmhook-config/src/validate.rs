//! Field-level validation for [`HostConfig`].

use swarmhook_events::MAX_REPLAY_CAPACITY;

use crate::error::{ConfigError, ConfigResult};
use crate::model::HostConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl HostConfig {
    /// Check every section for values the host cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::InvalidField {
                section: "logging",
                field: "level",
                value: Some(self.logging.level.clone()),
                reason: "unknown log level",
            });
        }

        if self.events.replay_capacity == 0 {
            return Err(ConfigError::InvalidField {
                section: "events",
                field: "replay_capacity",
                value: Some("0".to_string()),
                reason: "must be positive",
            });
        }

        if self.events.replay_capacity > MAX_REPLAY_CAPACITY {
            return Err(ConfigError::InvalidField {
                section: "events",
                field: "replay_capacity",
                value: Some(self.events.replay_capacity.to_string()),
                reason: "too large",
            });
        }

        if self
            .plugins
            .disabled
            .iter()
            .any(|name| name.trim().is_empty())
        {
            return Err(ConfigError::InvalidField {
                section: "plugins",
                field: "disabled",
                value: None,
                reason: "extension names must be non-empty",
            });
        }

        Ok(())
    }
}
