#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Configuration document for the plugin host.
//!
//! Layout: `model.rs` (typed sections), `loader.rs` (file/string/env sources),
//! `validate.rs` (field checks), `error.rs` (error taxonomy).

pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ENV_LOG_FORMAT, ENV_LOG_LEVEL};
pub use model::{EventSettings, HostConfig, LoggingSettings, PluginSettings};
