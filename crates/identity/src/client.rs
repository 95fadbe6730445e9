//! Confidential client registration
//!
//! One `ClientConfig` describes the app registration used by the web flow
//! (authorize + code exchange + refresh) and by the environment credential
//! (client credentials). Endpoints are derived from the authority host and
//! tenant so tests can point them at a local server.

use common::Secret;

use crate::constants::{DEFAULT_AUTHORITY_HOST, DEFAULT_TENANT, DELEGATED_SCOPES};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub authority_host: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: Option<Secret<String>>,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl ClientConfig {
    /// Registration against the public cloud with the delegated Graph scopes.
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            tenant_id: DEFAULT_TENANT.to_string(),
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
            scopes: DELEGATED_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    pub fn with_authority_host(mut self, authority_host: impl Into<String>) -> Self {
        self.authority_host = authority_host.into();
        self
    }

    pub fn with_client_secret(mut self, secret: Secret<String>) -> Self {
        self.client_secret = Some(secret);
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn authorize_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/authorize", self.authority())
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority())
    }

    fn authority(&self) -> String {
        format!(
            "{}/{}",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }
}
