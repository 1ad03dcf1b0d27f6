//! Error types for plugin-facing value types.

use thiserror::Error;

/// Errors raised while building or reading plugin-facing values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PluginError {
    /// An info-hash string was not 40 hexadecimal characters.
    #[error("invalid info-hash")]
    InvalidInfoHash {
        /// Offending input.
        value: String,
    },
    /// A bitfield was declared longer than its backing bytes.
    #[error("bitfield shorter than declared length")]
    BitfieldTooShort {
        /// Declared number of pieces.
        len: usize,
        /// Number of bytes supplied.
        bytes: usize,
    },
    /// A bitfield lookup fell outside the declared length.
    #[error("bitfield index out of range")]
    BitfieldIndexOutOfRange {
        /// Requested index.
        index: u32,
        /// Declared number of pieces.
        len: usize,
    },
}

/// Convenience alias for plugin value results.
pub type PluginResult<T> = Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_constant() {
        let cases = [
            (
                PluginError::InvalidInfoHash {
                    value: "zz".into(),
                },
                "invalid info-hash",
            ),
            (
                PluginError::BitfieldTooShort { len: 9, bytes: 1 },
                "bitfield shorter than declared length",
            ),
            (
                PluginError::BitfieldIndexOutOfRange { index: 4, len: 2 },
                "bitfield index out of range",
            ),
        ];
        for (err, message) in cases {
            assert_eq!(err.to_string(), message);
        }
    }
}
