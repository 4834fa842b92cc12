//! Error types for the network clients

use thiserror::Error;

/// Result type alias using our NetError
pub type Result<T> = std::result::Result<T, NetError>;

/// Network client error types
#[derive(Debug, Error)]
pub enum NetError {
    /// Transport-level HTTP failure (timeout, connection refused, ...)
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the server; the body has been logged
    #[error("api error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    /// WebSocket failure
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Wire codec failure on an encrypted device response
    #[error("codec error: {0}")]
    Codec(#[from] spool_bridge_core::Error),

    /// JSON (de)serialization failure
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Extra-field schema bootstrap exhausted its retries
    #[error("extra-field bootstrap failed: {0}")]
    Bootstrap(String),
}
