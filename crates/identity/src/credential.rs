//! Credential capability and the two confidential-client credentials
//!
//! Callers never see refresh tokens or expiry arithmetic: they hold an
//! `Arc<dyn TokenCredential>` and ask it for a bearer token before each
//! remote call. Each credential owns a tokio `Mutex` around its token state,
//! so concurrent callers sharing one credential serialize on renewal and all
//! observe the renewed token.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use common::Secret;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::ClientConfig;
use crate::constants::REFRESH_OFFSET_SECS;
use crate::error::{Error, Result};
use crate::token::{self, TokenResponse};

/// Bearer token with an absolute expiry (unix seconds).
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: Secret<String>,
    pub expires_on: u64,
}

impl AccessToken {
    pub fn new(token: String, expires_on: u64) -> Self {
        Self {
            token: Secret::new(token),
            expires_on,
        }
    }

    /// Raw token for an `Authorization: Bearer` header.
    pub fn secret(&self) -> &str {
        self.token.expose()
    }

    /// Whether the token expires within `REFRESH_OFFSET_SECS` of `now`.
    pub fn is_stale(&self, now: u64) -> bool {
        self.expires_on <= now + REFRESH_OFFSET_SECS
    }
}

/// Boxed future returned by `TokenCredential::get_token`.
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<AccessToken>> + Send + 'a>>;

/// Anything that can produce a currently-valid access token on demand.
///
/// Uses a boxed future so credentials can live behind `Arc<dyn TokenCredential>`.
pub trait TokenCredential: Send + Sync {
    /// Identifier for logs (e.g. "authorization_code", "azure_cli").
    fn name(&self) -> &str;

    /// Return a token valid for `scopes`, renewing it first if stale.
    fn get_token<'a>(&'a self, scopes: &'a [String]) -> TokenFuture<'a>;
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Per-scope token cache shared by the application credentials.
#[derive(Default)]
pub(crate) struct TokenCache {
    tokens: Mutex<HashMap<String, AccessToken>>,
}

impl TokenCache {
    #[cfg(test)]
    pub(crate) fn seeded(scopes: &[String], token: AccessToken) -> Self {
        let mut tokens = HashMap::new();
        tokens.insert(scopes.join(" "), token);
        Self {
            tokens: Mutex::new(tokens),
        }
    }

    /// Return the cached token for `scopes`, calling `fetch` when missing or stale.
    ///
    /// The lock is held across `fetch`, so concurrent callers wait for the
    /// in-flight acquisition instead of starting their own.
    pub(crate) async fn get_or_fetch<F, Fut>(
        &self,
        scopes: &[String],
        fetch: F,
    ) -> Result<AccessToken>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AccessToken>>,
    {
        let key = scopes.join(" ");
        let mut tokens = self.tokens.lock().await;
        if let Some(cached) = tokens.get(&key) {
            if !cached.is_stale(unix_now()) {
                return Ok(cached.clone());
            }
            debug!(scopes = %key, "cached token stale, re-acquiring");
        }
        let fresh = fetch().await?;
        tokens.insert(key, fresh.clone());
        Ok(fresh)
    }
}

struct UserTokens {
    access: AccessToken,
    refresh: Option<Secret<String>>,
}

/// Delegated credential produced by redeeming an authorization code.
///
/// Holds the signed-in user's access and refresh tokens. Renewal always
/// requests the scopes the user consented to at sign-in; the `scopes`
/// argument of `get_token` does not widen or narrow the grant.
pub struct AuthorizationCodeCredential {
    http: reqwest::Client,
    config: ClientConfig,
    tokens: Mutex<UserTokens>,
}

impl AuthorizationCodeCredential {
    /// Exchange `code` at the token endpoint and wrap the result.
    pub async fn redeem(
        http: reqwest::Client,
        config: ClientConfig,
        code: &str,
        verifier: Option<&str>,
    ) -> Result<Self> {
        let response = token::exchange_code(&http, &config, code, verifier).await?;
        debug!(
            has_refresh_token = response.refresh_token.is_some(),
            "authorization code redeemed"
        );
        Ok(Self::from_response(http, config, &response))
    }

    pub fn from_response(
        http: reqwest::Client,
        config: ClientConfig,
        response: &TokenResponse,
    ) -> Self {
        Self {
            http,
            config,
            tokens: Mutex::new(UserTokens {
                access: token::to_access_token(response),
                refresh: response.refresh_token.clone().map(Secret::new),
            }),
        }
    }

    #[cfg(test)]
    fn with_tokens(
        http: reqwest::Client,
        config: ClientConfig,
        access: AccessToken,
        refresh: Option<&str>,
    ) -> Self {
        Self {
            http,
            config,
            tokens: Mutex::new(UserTokens {
                access,
                refresh: refresh.map(|r| Secret::new(r.to_string())),
            }),
        }
    }
}

impl TokenCredential for AuthorizationCodeCredential {
    fn name(&self) -> &str {
        "authorization_code"
    }

    fn get_token<'a>(&'a self, _scopes: &'a [String]) -> TokenFuture<'a> {
        Box::pin(async move {
            let mut tokens = self.tokens.lock().await;
            if !tokens.access.is_stale(unix_now()) {
                return Ok(tokens.access.clone());
            }

            let refresh = tokens.refresh.as_ref().ok_or_else(|| {
                Error::InvalidCredentials(
                    "access token expired and no refresh token was issued".into(),
                )
            })?;
            let response = token::refresh_token(
                &self.http,
                &self.config,
                refresh.expose(),
                &self.config.scopes,
            )
            .await?;

            tokens.access = token::to_access_token(&response);
            // Rotated refresh tokens replace the old one; otherwise keep it.
            if let Some(rotated) = response.refresh_token {
                tokens.refresh = Some(Secret::new(rotated));
            }
            info!(expires_on = tokens.access.expires_on, "user token refreshed");
            Ok(tokens.access.clone())
        })
    }
}

/// Application credential using the client-credentials grant.
pub struct ClientSecretCredential {
    http: reqwest::Client,
    config: ClientConfig,
    cache: TokenCache,
}

impl ClientSecretCredential {
    pub fn new(http: reqwest::Client, config: ClientConfig) -> Self {
        Self {
            http,
            config,
            cache: TokenCache::default(),
        }
    }
}

impl TokenCredential for ClientSecretCredential {
    fn name(&self) -> &str {
        "client_secret"
    }

    fn get_token<'a>(&'a self, scopes: &'a [String]) -> TokenFuture<'a> {
        let http = &self.http;
        let config = &self.config;
        Box::pin(async move {
            self.cache
                .get_or_fetch(scopes, move || async move {
                    let response = token::client_credentials(http, config, scopes).await?;
                    Ok(token::to_access_token(&response))
                })
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::start_token_server;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    fn scopes() -> Vec<String> {
        vec!["https://graph.microsoft.com/.default".to_string()]
    }

    #[test]
    fn token_is_stale_inside_refresh_offset() {
        let now = 1_700_000_000;
        assert!(AccessToken::new("t".into(), now + 60).is_stale(now));
        assert!(AccessToken::new("t".into(), now + REFRESH_OFFSET_SECS).is_stale(now));
        assert!(!AccessToken::new("t".into(), now + REFRESH_OFFSET_SECS + 1).is_stale(now));
    }

    #[test]
    fn access_token_debug_is_redacted() {
        let token = AccessToken::new("eyJ-secret".into(), 0);
        let debug = format!("{token:?}");
        assert!(!debug.contains("eyJ-secret"), "got: {debug}");
    }

    #[tokio::test]
    async fn fresh_user_token_is_returned_without_network() {
        let (authority, hits) = start_token_server().await;
        let credential = AuthorizationCodeCredential::with_tokens(
            reqwest::Client::new(),
            crate::test_support::client_config(&authority),
            AccessToken::new("at_live".into(), unix_now() + 3600),
            Some("rt_ok"),
        );

        let token = credential.get_token(&scopes()).await.unwrap();
        assert_eq!(token.secret(), "at_live");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_user_token_is_refreshed_once_under_concurrency() {
        let (authority, hits) = start_token_server().await;
        let credential = Arc::new(AuthorizationCodeCredential::with_tokens(
            reqwest::Client::new(),
            crate::test_support::client_config(&authority),
            AccessToken::new("at_old".into(), unix_now()),
            Some("rt_ok"),
        ));

        let mut handles = vec![];
        for _ in 0..8 {
            let credential = credential.clone();
            handles.push(tokio::spawn(async move {
                credential
                    .get_token(&scopes())
                    .await
                    .unwrap()
                    .secret()
                    .to_string()
            }));
        }
        let mut seen = vec![];
        for h in handles {
            seen.push(h.await.unwrap());
        }

        assert_eq!(hits.load(Ordering::SeqCst), 1, "exactly one refresh");
        assert!(seen.iter().all(|t| t == "at_refresh_token_1"), "got: {seen:?}");
    }

    #[tokio::test]
    async fn rotated_refresh_token_is_kept() {
        let (authority, _hits) = start_token_server().await;
        let credential = AuthorizationCodeCredential::with_tokens(
            reqwest::Client::new(),
            crate::test_support::client_config(&authority),
            AccessToken::new("at_old".into(), 0),
            Some("rt_ok"),
        );
        credential.get_token(&scopes()).await.unwrap();

        let tokens = credential.tokens.lock().await;
        assert_eq!(tokens.refresh.as_ref().unwrap().expose(), "rt_rotated");
    }

    #[tokio::test]
    async fn stale_token_without_refresh_token_fails() {
        let credential = AuthorizationCodeCredential::with_tokens(
            reqwest::Client::new(),
            crate::test_support::client_config("http://127.0.0.1:1"),
            AccessToken::new("at_old".into(), 0),
            None,
        );
        let err = credential.get_token(&scopes()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn revoked_refresh_token_surfaces_invalid_credentials() {
        let (authority, _hits) = start_token_server().await;
        let credential = AuthorizationCodeCredential::with_tokens(
            reqwest::Client::new(),
            crate::test_support::client_config(&authority),
            AccessToken::new("at_old".into(), 0),
            Some("rt_revoked"),
        );
        let err = credential.get_token(&scopes()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn redeem_exchanges_code() {
        let (authority, hits) = start_token_server().await;
        let credential = AuthorizationCodeCredential::redeem(
            reqwest::Client::new(),
            crate::test_support::client_config(&authority),
            "abc123",
            Some("verifier"),
        )
        .await
        .unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let token = credential.get_token(&scopes()).await.unwrap();
        assert_eq!(token.secret(), "at_authorization_code_1");
        assert_eq!(hits.load(Ordering::SeqCst), 1, "no refresh for a fresh token");
    }

    #[tokio::test]
    async fn redeem_rejects_unknown_code() {
        let (authority, _hits) = start_token_server().await;
        let result = AuthorizationCodeCredential::redeem(
            reqwest::Client::new(),
            crate::test_support::client_config(&authority),
            "expired-code",
            None,
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidCredentials(_))));
    }

    #[tokio::test]
    async fn client_secret_credential_caches_per_scope() {
        let (authority, hits) = start_token_server().await;
        let credential = ClientSecretCredential::new(
            reqwest::Client::new(),
            crate::test_support::client_config(&authority),
        );

        let first = credential.get_token(&scopes()).await.unwrap();
        let second = credential.get_token(&scopes()).await.unwrap();
        assert_eq!(first.secret(), second.secret());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let other = vec!["api://other/.default".to_string()];
        credential.get_token(&other).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn seeded_cache_skips_fetch_while_fresh() {
        let cache = TokenCache::seeded(
            &scopes(),
            AccessToken::new("seed".into(), unix_now() + 3600),
        );
        let token = cache
            .get_or_fetch(&scopes(), || async {
                Err(Error::Unavailable("fetch must not run".into()))
            })
            .await
            .unwrap();
        assert_eq!(token.secret(), "seed");
    }
}
