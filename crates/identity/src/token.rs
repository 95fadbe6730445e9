//! Token endpoint grants
//!
//! Three grants POST to `ClientConfig::token_endpoint()`:
//! 1. `authorization_code`: completes the browser sign-in
//! 2. `refresh_token`: silent renewal of a signed-in user's token
//! 3. `client_credentials`: application-only token for unattended runs
//!
//! None of these retry. Failures are classified once and handed to the caller.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::ClientConfig;
use crate::credential::{AccessToken, unix_now};
use crate::error::{Error, Result};

/// Successful token endpoint response.
///
/// `expires_in` is a delta in seconds from the response time.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Convert to an absolute-expiry access token, anchored at `now` (unix seconds).
    pub fn access_token_at(&self, now: u64) -> AccessToken {
        AccessToken::new(self.access_token.clone(), now + self.expires_in)
    }
}

/// OAuth error body (`RFC 6749 §5.2`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Redeem an authorization code.
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &ClientConfig,
    code: &str,
    verifier: Option<&str>,
) -> Result<TokenResponse> {
    let scope = config.scopes.join(" ");
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("scope", scope.as_str()),
    ];
    if let Some(verifier) = verifier {
        form.push(("code_verifier", verifier));
    }
    post_form(client, config, form).await
}

/// Renew an access token with a refresh token.
pub async fn refresh_token(
    client: &reqwest::Client,
    config: &ClientConfig,
    refresh: &str,
    scopes: &[String],
) -> Result<TokenResponse> {
    let scope = scopes.join(" ");
    let form = vec![
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh),
        ("scope", scope.as_str()),
    ];
    post_form(client, config, form).await
}

/// Acquire an application token (no user involved).
pub async fn client_credentials(
    client: &reqwest::Client,
    config: &ClientConfig,
    scopes: &[String],
) -> Result<TokenResponse> {
    if config.client_secret.is_none() {
        return Err(Error::Config(
            "client credentials grant requires a client secret".into(),
        ));
    }
    let scope = scopes.join(" ");
    let form = vec![
        ("grant_type", "client_credentials"),
        ("scope", scope.as_str()),
    ];
    post_form(client, config, form).await
}

async fn post_form<'a>(
    client: &reqwest::Client,
    config: &'a ClientConfig,
    mut form: Vec<(&'a str, &'a str)>,
) -> Result<TokenResponse> {
    let grant = form.first().map(|(_, v)| *v).unwrap_or_default().to_string();
    form.push(("client_id", config.client_id.as_str()));
    if let Some(secret) = &config.client_secret {
        form.push(("client_secret", secret.expose().as_str()));
    }
    let form: HashMap<&str, &str> = form.into_iter().collect();

    let endpoint = config.token_endpoint();
    debug!(grant = %grant, endpoint = %endpoint, "requesting token");

    let response = client
        .post(&endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Http(format!("{grant} request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(classify_failure(status.as_u16(), &body));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid token response: {e}")))
}

/// Map a non-success token endpoint response to an error variant.
///
/// `invalid_grant` (expired/redeemed code, revoked refresh token) and
/// `invalid_client` (bad secret) are credential problems; 401/403 without a
/// parseable body are treated the same way.
fn classify_failure(status: u16, body: &str) -> Error {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => {
            let description = parsed
                .error_description
                .unwrap_or_else(|| String::from("no description"));
            let message = format!("{} ({status}): {description}", parsed.error);
            match parsed.error.as_str() {
                "invalid_grant" | "invalid_client" | "unauthorized_client" => {
                    Error::InvalidCredentials(message)
                }
                _ => Error::TokenExchange(message),
            }
        }
        Err(_) if status == 401 || status == 403 => {
            Error::InvalidCredentials(format!("token endpoint returned {status}: {body}"))
        }
        Err(_) => Error::TokenExchange(format!("token endpoint returned {status}: {body}")),
    }
}

/// Seconds-since-epoch anchor used when converting a fresh response.
pub(crate) fn to_access_token(response: &TokenResponse) -> AccessToken {
    response.access_token_at(unix_now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Form;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use common::Secret;
    use tokio::net::TcpListener;

    /// Token endpoint that accepts code "good-code", refresh token "rt_ok"
    /// and any client-credentials request carrying secret "s3cret".
    async fn start_token_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().route(
            "/{tenant}/oauth2/v2.0/token",
            axum::routing::post(|Form(form): Form<HashMap<String, String>>| async move {
                let ok = match form.get("grant_type").map(String::as_str) {
                    Some("authorization_code") => {
                        form.get("code").map(String::as_str) == Some("good-code")
                            && form.get("code_verifier").map(String::as_str) == Some("v-1")
                    }
                    Some("refresh_token") => {
                        form.get("refresh_token").map(String::as_str) == Some("rt_ok")
                    }
                    Some("client_credentials") => {
                        form.get("client_secret").map(String::as_str) == Some("s3cret")
                    }
                    _ => false,
                };
                if ok {
                    axum::Json(serde_json::json!({
                        "token_type": "Bearer",
                        "access_token": format!("at_{}", form["grant_type"]),
                        "refresh_token": "rt_next",
                        "expires_in": 3600,
                    }))
                    .into_response()
                } else if form.get("grant_type").map(String::as_str) == Some("client_credentials") {
                    (StatusCode::UNAUTHORIZED, "nope").into_response()
                } else {
                    (
                        StatusCode::BAD_REQUEST,
                        axum::Json(serde_json::json!({
                            "error": "invalid_grant",
                            "error_description": "AADSTS70008: The provided authorization code \
                                or refresh token has expired.",
                        })),
                    )
                        .into_response()
                }
            }),
        );
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn config(authority: &str) -> ClientConfig {
        ClientConfig::new("app-id", "http://localhost:8000/auth/callback")
            .with_authority_host(authority)
            .with_tenant("tenant-1")
            .with_client_secret(Secret::new("s3cret".to_string()))
    }

    #[test]
    fn token_response_deserializes_without_refresh_token() {
        let json = r#"{"token_type":"Bearer","access_token":"at_abc","expires_in":3599}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "at_abc");
        assert!(token.refresh_token.is_none());
        assert_eq!(token.access_token_at(1_000).expires_on, 4_599);
    }

    #[test]
    fn invalid_grant_is_an_invalid_credentials_error() {
        let err = classify_failure(
            400,
            r#"{"error":"invalid_grant","error_description":"code expired"}"#,
        );
        assert!(matches!(err, Error::InvalidCredentials(_)), "got: {err:?}");
        assert!(err.to_string().contains("code expired"));
    }

    #[test]
    fn other_oauth_errors_are_token_exchange_errors() {
        let err = classify_failure(400, r#"{"error":"invalid_scope"}"#);
        assert!(matches!(err, Error::TokenExchange(_)), "got: {err:?}");
    }

    #[test]
    fn unparseable_401_is_invalid_credentials() {
        let err = classify_failure(401, "<html>denied</html>");
        assert!(matches!(err, Error::InvalidCredentials(_)), "got: {err:?}");
        let err = classify_failure(503, "<html>down</html>");
        assert!(matches!(err, Error::TokenExchange(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn exchange_code_redeems_valid_code() {
        let authority = start_token_server().await;
        let client = reqwest::Client::new();
        let token = exchange_code(&client, &config(&authority), "good-code", Some("v-1"))
            .await
            .unwrap();
        assert_eq!(token.access_token, "at_authorization_code");
        assert_eq!(token.refresh_token.as_deref(), Some("rt_next"));
        assert_eq!(token.expires_in, 3600);
    }

    #[tokio::test]
    async fn exchange_code_rejects_invalid_code() {
        let authority = start_token_server().await;
        let client = reqwest::Client::new();
        let err = exchange_code(&client, &config(&authority), "bad-code", Some("v-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn refresh_token_renews() {
        let authority = start_token_server().await;
        let client = reqwest::Client::new();
        let token = refresh_token(&client, &config(&authority), "rt_ok", &["User.Read".into()])
            .await
            .unwrap();
        assert_eq!(token.access_token, "at_refresh_token");
    }

    #[tokio::test]
    async fn client_credentials_requires_secret() {
        let client = reqwest::Client::new();
        let config = ClientConfig::new("app-id", "unused");
        let err = client_credentials(&client, &config, &["scope".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn client_credentials_wrong_secret_is_rejected() {
        let authority = start_token_server().await;
        let client = reqwest::Client::new();
        let config = config(&authority).with_client_secret(Secret::new("wrong".to_string()));
        let err = client_credentials(&client, &config, &["scope".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_http_error() {
        let client = reqwest::Client::new();
        let err = exchange_code(&client, &config("http://127.0.0.1:1"), "code", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)), "got: {err:?}");
    }
}
