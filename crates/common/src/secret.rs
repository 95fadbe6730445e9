//! Redacting wrapper for client secrets, session keys and bearer tokens

use std::fmt;
use std::path::Path;

use zeroize::Zeroize;

use crate::error::{Error, Result};

/// Sensitive value - redacted in Debug/Display/logs, zeroed on drop
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Expose the inner value (use sparingly)
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Resolve a secret from an environment value, falling back to a file.
    ///
    /// The environment value wins when present and non-empty. File contents
    /// are trimmed; a whitespace-only file yields `None`. A configured file
    /// that cannot be read is an error rather than a silent fallback.
    pub fn resolve(env_value: Option<String>, file: Option<&Path>) -> Result<Option<Self>> {
        if let Some(value) = env_value.filter(|v| !v.is_empty()) {
            return Ok(Some(Self::new(value)));
        }
        let Some(file) = file else {
            return Ok(None);
        };
        let contents = std::fs::read_to_string(file).map_err(|e| {
            Error::Config(format!("failed to read secret file {}: {e}", file.display()))
        })?;
        let value = contents.trim();
        if value.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Self::new(value.to_owned())))
        }
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}
