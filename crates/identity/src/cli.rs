//! Azure CLI cached login
//!
//! Shells out to `az account get-access-token`, which reads the token cache
//! populated by `az login`. Missing CLI, a signed-out cache, or a hung process
//! all decline the source rather than failing the chain.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::chain::{CredentialSource, SourceFuture, probe};
use crate::credential::{AccessToken, TokenCache, TokenCredential, TokenFuture};
use crate::error::{Error, Result};

/// Upper bound on a single `az` invocation.
const CLI_TIMEOUT: Duration = Duration::from_secs(15);

/// Fields of `az account get-access-token --output json` we rely on.
///
/// `expires_on` (unix seconds) is present from Azure CLI 2.54 onwards.
#[derive(Deserialize)]
struct CliToken {
    #[serde(rename = "accessToken")]
    access_token: String,
    expires_on: Option<u64>,
}

pub struct AzureCliSource {
    program: PathBuf,
    tenant_id: Option<String>,
}

impl AzureCliSource {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            tenant_id: None,
        }
    }

    /// `az` from `PATH`, scoped to `AZURE_TENANT_ID` when set.
    pub fn from_env() -> Self {
        let mut source = Self::new("az");
        source.tenant_id = std::env::var("AZURE_TENANT_ID")
            .ok()
            .filter(|t| !t.is_empty());
        source
    }
}

impl CredentialSource for AzureCliSource {
    fn name(&self) -> &str {
        "azure_cli"
    }

    fn try_acquire<'a>(&'a self, scopes: &'a [String]) -> SourceFuture<'a> {
        Box::pin(async move {
            let credential = std::sync::Arc::new(AzureCliCredential {
                program: self.program.clone(),
                tenant_id: self.tenant_id.clone(),
                cache: TokenCache::default(),
            });
            probe(self.name(), credential, scopes).await
        })
    }
}

/// Credential re-invoking the CLI whenever the cached token goes stale.
pub struct AzureCliCredential {
    program: PathBuf,
    tenant_id: Option<String>,
    cache: TokenCache,
}

impl AzureCliCredential {
    async fn run(&self, scopes: &[String]) -> Result<AccessToken> {
        let mut command = Command::new(&self.program);
        command.args(["account", "get-access-token", "--output", "json"]);
        for scope in scopes {
            command.args(["--scope", scope]);
        }
        if let Some(tenant) = &self.tenant_id {
            command.args(["--tenant", tenant]);
        }
        command.kill_on_drop(true);

        let output = tokio::time::timeout(CLI_TIMEOUT, command.output())
            .await
            .map_err(|_| {
                Error::Unavailable(format!("az timed out after {}s", CLI_TIMEOUT.as_secs()))
            })?
            .map_err(|e| {
                Error::Unavailable(format!("failed to run {}: {e}", self.program.display()))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Unavailable(format!(
                "az exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_cli_output(&output.stdout)
    }
}

fn parse_cli_output(stdout: &[u8]) -> Result<AccessToken> {
    let token: CliToken = serde_json::from_slice(stdout)
        .map_err(|e| Error::Unavailable(format!("unexpected az output: {e}")))?;
    let expires_on = token.expires_on.ok_or_else(|| {
        Error::Unavailable(
            "az output has no expires_on; Azure CLI 2.54 or newer is required".into(),
        )
    })?;
    debug!(expires_on, "token obtained from Azure CLI");
    Ok(AccessToken::new(token.access_token, expires_on))
}

impl TokenCredential for AzureCliCredential {
    fn name(&self) -> &str {
        "azure_cli"
    }

    fn get_token<'a>(&'a self, scopes: &'a [String]) -> TokenFuture<'a> {
        Box::pin(async move { self.cache.get_or_fetch(scopes, || self.run(scopes)).await })
    }
}
