//! Error types for the offline-sync library.

use thiserror::Error;

/// Errors that can occur while synchronizing the offline cache.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error during cache storage operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be loaded or is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The deployment artifact is malformed or inconsistent.
    #[error("Invalid manifest: {0}")]
    Manifest(String),

    /// The network could not deliver a response.
    #[error("Network failure for {url}: {reason}")]
    Network {
        /// Requested URL.
        url: String,
        /// Transport-level failure description.
        reason: String,
    },

    /// A response arrived with a status that cannot be stored in a batch.
    #[error("Unexpected status {status} for {url}")]
    BadStatus {
        /// Requested URL.
        url: String,
        /// HTTP status code received.
        status: u16,
    },

    /// A cache entry on disk could not be interpreted.
    #[error("Cache storage error: {0}")]
    Storage(String),
}

/// A specialized `Result` type for offline-sync operations.
pub type Result<T> = std::result::Result<T, Error>;
