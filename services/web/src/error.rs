//! Request-level errors and their HTTP responses
//!
//! Sign-in failures render an HTML page (the browser is mid-redirect and
//! expects a document). API failures answer JSON in the same
//! `{"error": {"type": ..., ...}}` envelope for every variant.

use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use tracing::{error, warn};

use crate::metrics;

/// Sign-in and session errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No session cookie, a tampered cookie, or an id the store does not know.
    #[error("not authenticated")]
    Unauthenticated,

    #[error("state parameter missing or does not match")]
    InvalidState,

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    fn title(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "Not signed in",
            Self::InvalidState => "Sign-in request could not be verified",
            Self::AuthorizationDenied(_) => "Sign-in was not completed",
            Self::TokenExchange(_) => "Sign-in could not be completed",
            Self::Internal(_) => "Something went wrong",
        }
    }
}

/// `302 Found` with a `Location` header.
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthenticated => return found("/login"),
            Self::InvalidState | Self::AuthorizationDenied(_) | Self::TokenExchange(_) => {
                warn!(error = %self, "sign-in failed");
                StatusCode::BAD_REQUEST
            }
            Self::Internal(_) => {
                error!(error = %self, "sign-in internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Html(failure_page(self.title(), &self.to_string()))).into_response()
    }
}

fn failure_page(title: &str, detail: &str) -> String {
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
         <body><h1>{title}</h1><p>{}</p><p><a href=\"/login\">Try again</a></p></body></html>\n",
        escape_html(detail)
    )
}

/// Provider error descriptions arrive in the query string; never echo them raw.
fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Failure of a remote call made on behalf of a signed-in user.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub drive::Error);

fn json_error(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Provider statuses passed through to the browser; everything else is a 502.
fn mirrored_status(status: u16) -> StatusCode {
    match status {
        403 => StatusCode::FORBIDDEN,
        404 => StatusCode::NOT_FOUND,
        429 => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (kind, status, body) = match &self.0 {
            drive::Error::Api {
                status,
                code,
                message,
            } => (
                "remote_api_error",
                mirrored_status(*status),
                serde_json::json!({
                    "error": {
                        "type": "remote_api_error",
                        "status": status,
                        "code": code,
                        "message": message,
                    }
                }),
            ),
            drive::Error::Auth(e) => (
                "credential_expired",
                StatusCode::UNAUTHORIZED,
                serde_json::json!({
                    "error": {
                        "type": "credential_expired",
                        "message": format!("{e}; sign in again"),
                    }
                }),
            ),
            drive::Error::NotFound(message) => (
                "not_found",
                StatusCode::NOT_FOUND,
                serde_json::json!({"error": {"type": "not_found", "message": message}}),
            ),
            drive::Error::Http(_) | drive::Error::Decode(_) => (
                "upstream_unavailable",
                StatusCode::BAD_GATEWAY,
                serde_json::json!({
                    "error": {"type": "upstream_unavailable", "message": self.0.to_string()}
                }),
            ),
            drive::Error::Io(_) => (
                "internal_error",
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({
                    "error": {"type": "internal_error", "message": "internal error"}
                }),
            ),
        };
        warn!(kind, error = %self.0, "remote call failed");
        metrics::record_remote_error(kind);
        json_error(status, body)
    }
}
