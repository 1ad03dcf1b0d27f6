//! Error types for plugin host operations.

use thiserror::Error;

/// Primary error type for host operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostError {
    /// Extension names must contain a non-whitespace character.
    #[error("invalid extension name")]
    InvalidName {
        /// Offending name.
        name: String,
    },
    /// An extension with the same name is already installed.
    #[error("extension already registered")]
    DuplicateExtension {
        /// Name of the existing extension.
        name: String,
    },
}

/// Convenience alias for host results.
pub type HostResult<T> = Result<T, HostError>;
