//! Error types for UVGestor

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A field failed validation before any I/O happened
    #[error("Validation error: {0}")]
    Validation(String),

    /// The remote store (or identity provider) could not be reached or refused the call
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error came from the remote side and can be absorbed by
    /// falling back to local data
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_))
    }

    /// Whether this error came from the local store
    pub fn is_local_store(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Pool(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Self::RemoteUnavailable(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
