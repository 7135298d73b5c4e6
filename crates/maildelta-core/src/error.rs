//! Error types for the core library.

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Protocol engine failure (connect, contract violation, timeout).
    #[error("Protocol error: {0}")]
    Proto(#[from] maildelta_proto::Error),

    /// MIME decoding failed.
    #[error("MIME error: {0}")]
    Mime(#[from] maildelta_mime::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The server refused the credentials, or did not answer in time.
    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// A sync cycle was abandoned before anything was persisted.
    #[error("Sync aborted: {0}")]
    SyncAborted(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
