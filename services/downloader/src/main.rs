//! drive-download
//!
//! Unattended copy of one SharePoint folder to a local directory. Credentials
//! come from the first working source in the chain: `az login`, then
//! `AZURE_*` client-secret variables, then the host's managed identity.
//!
//! Exits non-zero on configuration errors, when no credential source works,
//! or when the remote API rejects a request.

mod config;
mod download;

use std::time::Duration;

use anyhow::{Context, Result};
use identity::CredentialChain;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    let config = Config::from_env().context("invalid downloader configuration")?;
    info!(
        hostname = %config.hostname,
        site = %config.site_path,
        folder = %config.folder_path,
        download_dir = %config.download_dir.display(),
        "starting download"
    );

    let http = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;
    let chain = CredentialChain::from_env(http.clone());

    let summary = download::run(&config, &chain, http)
        .await
        .context("download failed")?;

    info!(
        downloaded = summary.downloaded.len(),
        skipped_folders = summary.skipped_folders,
        "download complete"
    );
    Ok(())
}
