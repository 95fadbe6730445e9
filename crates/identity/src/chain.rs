//! Ordered credential chain for unattended runs
//!
//! Each `CredentialSource` either yields a working credential or declines.
//! The chain asks them in order and stops at the first success:
//!
//! 1. `AzureCliSource`: token cached by `az login`
//! 2. `EnvironmentSource`: `AZURE_TENANT_ID` / `AZURE_CLIENT_ID` / `AZURE_CLIENT_SECRET`
//! 3. `ManagedIdentitySource`: App Service or IMDS endpoint on the host
//!
//! A source "succeeds" only after it has produced one token, so a present but
//! broken configuration falls through to the next source instead of failing
//! later on the first remote call.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cli::AzureCliSource;
use crate::client::ClientConfig;
use crate::constants::DEFAULT_AUTHORITY_HOST;
use crate::credential::{ClientSecretCredential, TokenCredential};
use crate::error::{Error, Result};
use crate::managed_identity::ManagedIdentitySource;

/// Boxed future returned by `CredentialSource::try_acquire`.
pub type SourceFuture<'a> =
    Pin<Box<dyn Future<Output = Option<Arc<dyn TokenCredential>>> + Send + 'a>>;

/// One entry in the chain.
pub trait CredentialSource: Send + Sync {
    fn name(&self) -> &str;

    /// Build a credential and prove it works for `scopes`, or return `None`.
    fn try_acquire<'a>(&'a self, scopes: &'a [String]) -> SourceFuture<'a>;
}

/// Acquire one token from `credential`; keep it only if that succeeds.
pub(crate) async fn probe(
    source: &str,
    credential: Arc<dyn TokenCredential>,
    scopes: &[String],
) -> Option<Arc<dyn TokenCredential>> {
    match credential.get_token(scopes).await {
        Ok(_) => Some(credential),
        Err(e) => {
            debug!(source, error = %e, "credential source declined");
            None
        }
    }
}

pub struct CredentialChain {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl CredentialChain {
    pub fn new(sources: Vec<Box<dyn CredentialSource>>) -> Self {
        Self { sources }
    }

    /// CLI login, then environment secret, then managed identity, configured
    /// from the process environment.
    pub fn from_env(http: reqwest::Client) -> Self {
        Self::new(vec![
            Box::new(AzureCliSource::from_env()),
            Box::new(EnvironmentSource::from_env(http.clone())),
            Box::new(ManagedIdentitySource::from_env(http)),
        ])
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Return the first credential any source can produce.
    pub async fn acquire(&self, scopes: &[String]) -> Result<Arc<dyn TokenCredential>> {
        for source in &self.sources {
            debug!(source = source.name(), "trying credential source");
            if let Some(credential) = source.try_acquire(scopes).await {
                info!(source = source.name(), "credential acquired");
                return Ok(credential);
            }
        }
        warn!(sources = ?self.source_names(), "credential chain exhausted");
        Err(Error::ChainExhausted(self.source_names()))
    }
}

/// Client secret from the environment (`ClientSecretCredential`).
pub struct EnvironmentSource {
    http: reqwest::Client,
    config: Option<ClientConfig>,
}

impl EnvironmentSource {
    pub fn from_env(http: reqwest::Client) -> Self {
        Self::from_lookup(http, |key| std::env::var(key).ok())
    }

    /// Read `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET` and
    /// optional `AZURE_AUTHORITY_HOST` through `lookup`. All three required
    /// variables must be non-empty for the source to be configured.
    pub fn from_lookup(http: reqwest::Client, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let config = match (
            get("AZURE_TENANT_ID"),
            get("AZURE_CLIENT_ID"),
            get("AZURE_CLIENT_SECRET"),
        ) {
            (Some(tenant), Some(client_id), Some(secret)) => Some(
                ClientConfig::new(client_id, String::new())
                    .with_tenant(tenant)
                    .with_authority_host(
                        get("AZURE_AUTHORITY_HOST")
                            .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
                    )
                    .with_client_secret(secret.into()),
            ),
            _ => None,
        };
        Self { http, config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }
}

impl CredentialSource for EnvironmentSource {
    fn name(&self) -> &str {
        "environment"
    }

    fn try_acquire<'a>(&'a self, scopes: &'a [String]) -> SourceFuture<'a> {
        Box::pin(async move {
            let Some(config) = &self.config else {
                debug!("AZURE_TENANT_ID/AZURE_CLIENT_ID/AZURE_CLIENT_SECRET not set");
                return None;
            };
            let credential: Arc<dyn TokenCredential> =
                Arc::new(ClientSecretCredential::new(self.http.clone(), config.clone()));
            probe(self.name(), credential, scopes).await
        })
    }
}
