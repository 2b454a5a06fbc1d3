//! Error types for the graph_drive crate.

use thiserror::Error;

/// Errors that can occur when interacting with Microsoft Graph drives.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid client configuration: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The service accepted a write but returned no usable metadata.
    /// Distinct from [`Error::NotFound`]: the side effect may have occurred.
    #[error("Operation failed: {0}")]
    OperationFailed(String),

    #[error("Graph API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Token acquisition failed: {0}")]
    TokenAcquisition(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
