//! Authorization request: anti-forgery state, PKCE pair and redirect URL
//!
//! The web flow sends the browser to `build_authorization_url()` with a fresh
//! `state` and S256 challenge. Both the state and the verifier stay with the
//! browser in signed cookies until the provider redirects back.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};
use url::Url;

use crate::client::ClientConfig;
use crate::constants::OFFLINE_ACCESS_SCOPE;
use crate::error::{Error, Result};

/// Generate an opaque anti-forgery `state` value (32 random bytes, base64url).
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a PKCE code verifier.
///
/// 64 random bytes encode to 86 base64url characters, inside the 43-128
/// range RFC 7636 allows.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 64];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Build the provider authorize URL for an authorization-code request.
///
/// `offline_access` is appended to the configured scopes so the code
/// exchange yields a refresh token.
pub fn build_authorization_url(
    config: &ClientConfig,
    state: &str,
    challenge: &str,
) -> Result<String> {
    let mut scopes = config.scopes.clone();
    if !scopes.iter().any(|s| s == OFFLINE_ACCESS_SCOPE) {
        scopes.push(OFFLINE_ACCESS_SCOPE.to_string());
    }
    let scope = scopes.join(" ");

    let url = Url::parse_with_params(
        &config.authorize_endpoint(),
        &[
            ("client_id", config.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", config.redirect_uri.as_str()),
            ("response_mode", "query"),
            ("scope", scope.as_str()),
            ("state", state),
            ("code_challenge", challenge),
            ("code_challenge_method", "S256"),
        ],
    )
    .map_err(|e| Error::Config(format!("invalid authorize endpoint: {e}")))?;

    Ok(url.into())
}
