//! Configuration types and loading
//!
//! Precedence: `--config` flag > `CONFIG_PATH` env var > `drive-browser.toml`
//! for the file itself, then environment variables over file values.
//! The application secret and the session secret are never read from the
//! TOML directly; they come from env vars or from files named in it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum_extra::extract::cookie::Key;
use common::Secret;
use serde::Deserialize;
use sha2::{Digest, Sha512};
use tracing::warn;

/// Minimum session secret length; the cookie key is derived from it.
const MIN_SESSION_SECRET_LEN: usize = 32;

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub graph: GraphConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Mark cookies `Secure`. Defaults to whether the redirect URI is https.
    #[serde(default)]
    pub secure_cookies: Option<bool>,
}

/// App registration used for the authorization-code flow.
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Path to a file containing the client secret (alternative to APPLICATION_SECRET)
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    #[serde(skip)]
    pub secret: Option<Secret<String>>,
    /// Path to a file containing the cookie signing secret (alternative to SESSION_SECRET)
    #[serde(default)]
    pub secret_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_graph_base_url")]
    pub base_url: String,
    #[serde(default = "default_graph_timeout")]
    pub timeout_secs: u64,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_max_connections() -> usize {
    256
}

fn default_tenant() -> String {
    identity::DEFAULT_TENANT.to_string()
}

fn default_redirect_uri() -> String {
    "http://localhost:8000/auth/callback".to_string()
}

fn default_authority_host() -> String {
    identity::DEFAULT_AUTHORITY_HOST.to_string()
}

fn default_scopes() -> Vec<String> {
    identity::DELEGATED_SCOPES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_graph_base_url() -> String {
    drive::GRAPH_BASE_URL.to_string()
}

fn default_graph_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_connections: default_max_connections(),
            secure_cookies: None,
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            tenant_id: default_tenant(),
            redirect_uri: default_redirect_uri(),
            authority_host: default_authority_host(),
            scopes: default_scopes(),
            client_secret: None,
            client_secret_file: None,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: default_graph_base_url(),
            timeout_secs: default_graph_timeout(),
        }
    }
}

/// Non-empty value of an environment variable.
fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// `APPLICATION_ID`, `TENANT_ID` and `REDIRECT_URI` replace their file
    /// values. Secrets resolve env var first, then the configured file.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Some(id) = env_var("APPLICATION_ID") {
            config.oauth.client_id = id;
        }
        if let Some(tenant) = env_var("TENANT_ID") {
            config.oauth.tenant_id = tenant;
        }
        if let Some(uri) = env_var("REDIRECT_URI") {
            config.oauth.redirect_uri = uri;
        }

        config.oauth.client_secret = Secret::resolve(
            std::env::var("APPLICATION_SECRET").ok(),
            config.oauth.client_secret_file.as_deref(),
        )?;
        config.session.secret = Secret::resolve(
            std::env::var("SESSION_SECRET").ok(),
            config.session.secret_file.as_deref(),
        )?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.oauth.client_id.trim().is_empty() {
            return Err(common::Error::Config(
                "oauth.client_id is empty; set it in the file or via APPLICATION_ID".into(),
            ));
        }
        if self.oauth.client_secret.is_none() {
            return Err(common::Error::Config(
                "client secret missing; set APPLICATION_SECRET or oauth.client_secret_file".into(),
            ));
        }
        if !is_http_url(&self.oauth.redirect_uri) {
            return Err(common::Error::Config(format!(
                "redirect_uri must start with http:// or https://, got: {}",
                self.oauth.redirect_uri
            )));
        }
        if !is_http_url(&self.oauth.authority_host) {
            return Err(common::Error::Config(format!(
                "authority_host must start with http:// or https://, got: {}",
                self.oauth.authority_host
            )));
        }
        if self.oauth.scopes.is_empty() {
            return Err(common::Error::Config("oauth.scopes must not be empty".into()));
        }
        if !is_http_url(&self.graph.base_url) {
            return Err(common::Error::Config(format!(
                "graph.base_url must start with http:// or https://, got: {}",
                self.graph.base_url
            )));
        }
        if self.graph.timeout_secs == 0 {
            return Err(common::Error::Config(
                "graph.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        let short_secret = self
            .session
            .secret
            .as_ref()
            .is_some_and(|s| s.expose().len() < MIN_SESSION_SECRET_LEN);
        if short_secret {
            return Err(common::Error::Config(format!(
                "session secret too short: need at least {MIN_SESSION_SECRET_LEN} bytes"
            )));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("drive-browser.toml")
    }

    pub fn client_config(&self) -> identity::ClientConfig {
        let mut client = identity::ClientConfig::new(
            self.oauth.client_id.clone(),
            self.oauth.redirect_uri.clone(),
        )
        .with_tenant(self.oauth.tenant_id.clone())
        .with_authority_host(self.oauth.authority_host.clone())
        .with_scopes(self.oauth.scopes.clone());
        if let Some(secret) = &self.oauth.client_secret {
            client = client.with_client_secret(secret.clone());
        }
        client
    }

    /// Cookie signing key: SHA-512 of the session secret, or a random
    /// per-process key when none is configured.
    pub fn cookie_key(&self) -> Key {
        match &self.session.secret {
            Some(secret) => derive_cookie_key(secret.expose()),
            None => {
                warn!("no session secret configured; sessions will not survive a restart");
                Key::generate()
            }
        }
    }

    pub fn secure_cookies(&self) -> bool {
        self.server
            .secure_cookies
            .unwrap_or_else(|| self.oauth.redirect_uri.starts_with("https://"))
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// 64-byte signing key from an arbitrary-length secret.
pub fn derive_cookie_key(secret: &str) -> Key {
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}
