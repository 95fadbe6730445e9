//! Error types for remote file operations

/// Errors from the drive client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The remote API answered with a non-success status.
    #[error("remote API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("credential error: {0}")]
    Auth(#[from] identity::Error),

    #[error("HTTP request failed: {0}")]
    Http(String),

    /// A lookup succeeded but returned no usable object.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Provider status for `Api` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result alias for drive operations.
pub type Result<T> = std::result::Result<T, Error>;
