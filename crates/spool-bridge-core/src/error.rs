//! Error types for the bridge core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Bridge core error types
#[derive(Debug, Error)]
pub enum Error {
    /// AEAD tag did not verify (wrong key or tampered ciphertext)
    #[error("authentication failed: ciphertext rejected")]
    Authentication,

    /// AEAD encryption failed
    #[error("encryption failed")]
    Encryption,

    /// Wire string too short, non-ASCII, or not valid base64
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Recovered bytes are not valid UTF-8
    #[error("encoding error: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    /// A CSV record field failed to decode
    #[error("invalid {field} field: {reason}")]
    InvalidField { field: &'static str, reason: String },
}
