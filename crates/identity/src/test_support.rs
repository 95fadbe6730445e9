//! In-process token endpoint for credential tests

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::Secret;
use tokio::net::TcpListener;

use crate::client::ClientConfig;

/// Config pointing at `authority` with tenant "tenant-1" and secret "s3cret".
pub(crate) fn client_config(authority: &str) -> ClientConfig {
    ClientConfig::new("app-id", "http://localhost:8000/auth/callback")
        .with_authority_host(authority)
        .with_tenant("tenant-1")
        .with_client_secret(Secret::new("s3cret".to_string()))
}

/// Start a token endpoint and return its authority URL plus a hit counter.
///
/// Accepts code "abc123", refresh token "rt_ok" (rotating to "rt_rotated")
/// and client secret "s3cret". Issued access tokens are named
/// `at_{grant_type}_{hit}`. Each request sleeps briefly so concurrent
/// callers overlap.
pub(crate) async fn start_token_server() -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = axum::Router::new()
        .route("/{tenant}/oauth2/v2.0/token", axum::routing::post(token_handler))
        .with_state(hits.clone());
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (format!("http://{addr}"), hits)
}

async fn token_handler(
    State(hits): State<Arc<AtomicUsize>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let hit = hits.fetch_add(1, Ordering::SeqCst) + 1;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let field = |k: &str| form.get(k).map(String::as_str);
    let grant = field("grant_type").unwrap_or_default();
    let (accepted, refresh) = match grant {
        "authorization_code" => (field("code") == Some("abc123"), Some("rt_ok")),
        "refresh_token" => (field("refresh_token") == Some("rt_ok"), Some("rt_rotated")),
        "client_credentials" => (field("client_secret") == Some("s3cret"), None),
        _ => (false, None),
    };

    if !accepted {
        let error = if grant == "client_credentials" {
            "invalid_client"
        } else {
            "invalid_grant"
        };
        return (
            StatusCode::BAD_REQUEST,
            axum::Json(serde_json::json!({
                "error": error,
                "error_description": "rejected by test token endpoint",
            })),
        )
            .into_response();
    }

    axum::Json(serde_json::json!({
        "token_type": "Bearer",
        "access_token": format!("at_{grant}_{hit}"),
        "refresh_token": refresh,
        "expires_in": 3600,
    }))
    .into_response()
}
