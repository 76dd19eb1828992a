//! Error types for the pilvi-dl library.

use thiserror::Error;

/// Errors that can occur while bootstrapping, paginating or downloading.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A base URL or endpoint path could not be parsed.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Login or token extraction failed.
    #[error("session bootstrap failed: {0}")]
    Bootstrap(String),

    /// The server answered with an unexpected status code.
    #[error("unexpected status {status} from {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// A catalog page did not have the expected shape.
    #[error("malformed catalog page: {0}")]
    MalformedPage(String),

    /// A server-supplied filename has no usable final component.
    #[error("unusable filename: {0:?}")]
    InvalidFilename(String),

    /// The run was cancelled before the task started.
    #[error("cancelled")]
    Cancelled,
}

/// A specialized `Result` type for pilvi-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
