//! Error types for RbVault

use thiserror::Error;
use std::io;

/// Result type alias for RbVault operations
pub type Result<T> = std::result::Result<T, RbVaultError>;

/// Custom error types for RbVault
#[derive(Error, Debug)]
pub enum RbVaultError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Read or extraction on a store holding no entries.
    #[error("No nodes in tree")]
    Empty,

    /// Extraction mode flag outside `{0, 1}`.
    #[error("Invalid extraction mode: {0}")]
    InvalidMode(i64),

    #[error("Malformed packet: expected 12 bytes, got {len}")]
    MalformedPacket { len: usize },

    #[error("Script parse error on line {line}: {reason}")]
    ScriptParse { line: usize, reason: String },

    #[error("Unknown session: {0}")]
    UnknownSession(i64),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Scheduling error: {0}")]
    Scheduling(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(RbVaultError::Empty.to_string(), "No nodes in tree");
        assert_eq!(
            RbVaultError::MalformedPacket { len: 11 }.to_string(),
            "Malformed packet: expected 12 bytes, got 11"
        );
        assert_eq!(
            RbVaultError::ScriptParse { line: 4, reason: "missing key".to_string() }.to_string(),
            "Script parse error on line 4: missing key"
        );
    }
}
