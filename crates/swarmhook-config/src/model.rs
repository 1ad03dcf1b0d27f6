//! Typed configuration sections.
//!
//! Every field has a default so an empty document (`{}`) is a valid configuration.

use serde::{Deserialize, Serialize};
use swarmhook_telemetry::{DEFAULT_LOG_LEVEL, LogFormat};

/// Default replay ring size for the host event bus.
pub const DEFAULT_REPLAY_CAPACITY: usize = 256;

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Logging output settings.
    pub logging: LoggingSettings,
    /// Event bus settings.
    pub events: EventSettings,
    /// Plugin registration settings.
    pub plugins: PluginSettings,
}

/// Logging output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::infer(),
        }
    }
}

/// Event bus settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EventSettings {
    /// Number of events retained for replay.
    pub replay_capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            replay_capacity: DEFAULT_REPLAY_CAPACITY,
        }
    }
}

/// Plugin registration settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginSettings {
    /// Extension names the host refuses to install.
    pub disabled: Vec<String>,
}

impl PluginSettings {
    /// Whether the named extension is disabled.
    #[must_use]
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|disabled| disabled == name)
    }
}
