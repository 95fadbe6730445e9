//! Microsoft identity platform sign-in and credentials
//!
//! Two consumers share this crate:
//!
//! Interactive web sign-in:
//! 1. `authorize::generate_state()` + `generate_verifier()` per login attempt
//! 2. Browser sent to `authorize::build_authorization_url()`
//! 3. Callback redeems the code with `AuthorizationCodeCredential::redeem()`
//! 4. The credential renews itself via `token::refresh_token()` when stale
//!
//! Unattended runs:
//! 1. `CredentialChain::from_env()` lists CLI login, environment secret and
//!    managed identity, in that order
//! 2. `CredentialChain::acquire()` returns the first source that produces a token
//!
//! Either way the caller ends up with an `Arc<dyn TokenCredential>` and never
//! touches refresh tokens directly.

pub mod authorize;
pub mod chain;
pub mod cli;
pub mod client;
pub mod constants;
pub mod credential;
pub mod error;
pub mod managed_identity;
pub mod token;

#[cfg(test)]
mod test_support;

pub use authorize::{build_authorization_url, compute_challenge, generate_state, generate_verifier};
pub use chain::{CredentialChain, CredentialSource, EnvironmentSource};
pub use cli::AzureCliSource;
pub use client::ClientConfig;
pub use constants::*;
pub use credential::{
    AccessToken, AuthorizationCodeCredential, ClientSecretCredential, TokenCredential, TokenFuture,
};
pub use error::{Error, Result};
pub use managed_identity::ManagedIdentitySource;
pub use token::{TokenResponse, client_credentials, exchange_code, refresh_token};
