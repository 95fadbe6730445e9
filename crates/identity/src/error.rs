//! Error types for sign-in and token acquisition

/// Errors from OAuth and credential operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("credential source unavailable: {0}")]
    Unavailable(String),

    #[error("no credential source succeeded (tried: {})", .0.join(", "))]
    ChainExhausted(Vec<String>),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for identity operations.
pub type Result<T> = std::result::Result<T, Error>;
