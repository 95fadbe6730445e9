//! Configuration errors shared by both binaries

use thiserror::Error;

/// Common error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("missing required environment variable {0}")]
    MissingEnv(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;
