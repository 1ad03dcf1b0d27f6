//! Telemetry primitives shared across the swarmhook workspace.
//!
//! Centralises tracing subscriber setup so the host and any embedding engine log with one
//! consistent format.

pub mod error;
pub mod init;

pub use error::{Result, TelemetryError};
pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
