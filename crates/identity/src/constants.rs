//! Microsoft identity platform endpoints and scopes
//!
//! None of these are secrets. The client secret and the tokens it yields are
//! carried in `common::Secret` and never appear here.

/// Public-cloud authority host; tenant and `/oauth2/v2.0/...` are appended.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Multi-tenant authority segment accepting work and personal accounts.
pub const DEFAULT_TENANT: &str = "common";

/// Delegated Graph permissions requested at sign-in.
pub const DELEGATED_SCOPES: &[&str] = &["User.Read", "Files.Read.All", "Sites.Read.All"];

/// Added to every authorize request so the token endpoint issues a refresh token.
pub const OFFLINE_ACCESS_SCOPE: &str = "offline_access";

/// Application-permission scope for the Graph API (client credentials, CLI, managed identity).
pub const GRAPH_DEFAULT_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Instance Metadata Service token endpoint for VM-hosted managed identities.
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Tokens closer than this to expiry are treated as stale and re-acquired.
pub const REFRESH_OFFSET_SECS: u64 = 300;
