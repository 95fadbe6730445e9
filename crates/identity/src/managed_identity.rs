//! Managed identity of the hosting platform
//!
//! App Service and Functions expose `IDENTITY_ENDPOINT` + `IDENTITY_HEADER`;
//! virtual machines expose the Instance Metadata Service at a fixed address.
//! Both hand out tokens for a *resource*, not a scope list, so the
//! `/.default` suffix is stripped before the request.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::chain::{CredentialSource, SourceFuture, probe};
use crate::constants::IMDS_ENDPOINT;
use crate::credential::{AccessToken, TokenCache, TokenCredential, TokenFuture};
use crate::error::{Error, Result};

/// IMDS is link-local; an unreachable address must fail fast.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const IMDS_API_VERSION: &str = "2018-02-01";

#[derive(Debug, Clone)]
enum Endpoint {
    AppService { url: String, header: String },
    Imds { url: String },
}

impl Endpoint {
    fn kind(&self) -> &'static str {
        match self {
            Endpoint::AppService { .. } => "app_service",
            Endpoint::Imds { .. } => "imds",
        }
    }
}

pub struct ManagedIdentitySource {
    http: reqwest::Client,
    endpoint: Endpoint,
}

impl ManagedIdentitySource {
    pub fn from_env(http: reqwest::Client) -> Self {
        Self::from_lookup(http, |key| std::env::var(key).ok())
    }

    /// App Service when both `IDENTITY_ENDPOINT` and `IDENTITY_HEADER` are
    /// non-empty, IMDS otherwise.
    pub fn from_lookup(http: reqwest::Client, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let endpoint = match (get("IDENTITY_ENDPOINT"), get("IDENTITY_HEADER")) {
            (Some(url), Some(header)) => Endpoint::AppService { url, header },
            _ => Endpoint::Imds {
                url: IMDS_ENDPOINT.to_string(),
            },
        };
        Self { http, endpoint }
    }

    /// IMDS at a non-default address.
    pub fn imds(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: Endpoint::Imds { url: url.into() },
        }
    }

    pub fn endpoint_kind(&self) -> &'static str {
        self.endpoint.kind()
    }
}

impl CredentialSource for ManagedIdentitySource {
    fn name(&self) -> &str {
        "managed_identity"
    }

    fn try_acquire<'a>(&'a self, scopes: &'a [String]) -> SourceFuture<'a> {
        Box::pin(async move {
            let credential = Arc::new(ManagedIdentityCredential {
                http: self.http.clone(),
                endpoint: self.endpoint.clone(),
                cache: TokenCache::default(),
            });
            probe(self.name(), credential, scopes).await
        })
    }
}

/// `expires_on` arrives as a string from some hosts and a number from others.
#[derive(Deserialize)]
#[serde(untagged)]
enum ExpiresOn {
    Number(u64),
    Text(String),
}

#[derive(Deserialize)]
struct MiTokenResponse {
    access_token: String,
    expires_on: ExpiresOn,
}

pub struct ManagedIdentityCredential {
    http: reqwest::Client,
    endpoint: Endpoint,
    cache: TokenCache,
}

/// Managed identity endpoints accept exactly one resource.
fn resource_for(scopes: &[String]) -> Result<String> {
    match scopes {
        [scope] => Ok(scope
            .strip_suffix("/.default")
            .unwrap_or(scope)
            .to_string()),
        _ => Err(Error::Config(format!(
            "managed identity requires exactly one scope, got {}",
            scopes.len()
        ))),
    }
}

impl ManagedIdentityCredential {
    async fn fetch(&self, scopes: &[String]) -> Result<AccessToken> {
        let resource = resource_for(scopes)?;
        let (base, api_version) = match &self.endpoint {
            Endpoint::AppService { url, .. } => (url, APP_SERVICE_API_VERSION),
            Endpoint::Imds { url } => (url, IMDS_API_VERSION),
        };
        let url = Url::parse_with_params(
            base,
            &[("api-version", api_version), ("resource", resource.as_str())],
        )
        .map_err(|e| Error::Config(format!("invalid managed identity endpoint: {e}")))?;

        let request = match &self.endpoint {
            Endpoint::AppService { header, .. } => {
                self.http.get(url).header("X-IDENTITY-HEADER", header)
            }
            Endpoint::Imds { .. } => self.http.get(url).header("Metadata", "true"),
        };

        debug!(
            endpoint = self.endpoint.kind(),
            resource = %resource,
            "requesting managed identity token"
        );
        let response = request
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                Error::Unavailable(format!("managed identity endpoint unreachable: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Unavailable(format!(
                "managed identity endpoint returned {status}: {body}"
            )));
        }

        let parsed: MiTokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Unavailable(format!("invalid managed identity response: {e}")))?;
        let expires_on = match parsed.expires_on {
            ExpiresOn::Number(n) => n,
            ExpiresOn::Text(s) => s.trim().parse().map_err(|_| {
                Error::Unavailable(format!("unparseable expires_on from managed identity: {s}"))
            })?,
        };
        Ok(AccessToken::new(parsed.access_token, expires_on))
    }
}

impl TokenCredential for ManagedIdentityCredential {
    fn name(&self) -> &str {
        "managed_identity"
    }

    fn get_token<'a>(&'a self, scopes: &'a [String]) -> TokenFuture<'a> {
        Box::pin(async move { self.cache.get_or_fetch(scopes, || self.fetch(scopes)).await })
    }
}
