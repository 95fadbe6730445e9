//! Browser sign-in: `/login`, `/auth/callback`, `/logout`
//!
//! `state` and the PKCE verifier ride in signed, short-lived cookies scoped to
//! `/auth` between the redirect to the provider and the callback. A
//! successful callback stores the credential server-side and hands the
//! browser only a signed `sid` cookie holding the session id.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts, Query, State};
use axum::http::request::Parts;
use axum::response::Response;
use axum_extra::extract::SignedCookieJar;
use axum_extra::extract::cookie::{Cookie, Key, SameSite};
use identity::{AuthorizationCodeCredential, TokenCredential};
use serde::Deserialize;
use tracing::{info, warn};

use crate::AppState;
use crate::error::{AuthError, found};
use crate::metrics;
use crate::session::SessionRecord;

pub const SESSION_COOKIE: &str = "sid";
pub const STATE_COOKIE: &str = "oauth_state";
pub const VERIFIER_COOKIE: &str = "oauth_verifier";

/// Flow cookies are only sent back to the callback.
const FLOW_COOKIE_PATH: &str = "/auth";
const FLOW_COOKIE_MINUTES: i64 = 10;

/// Display name used when the profile lookup fails at sign-in.
const FALLBACK_USER_NAME: &str = "User";

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

fn flow_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path(FLOW_COOKIE_PATH)
        .max_age(time::Duration::minutes(FLOW_COOKIE_MINUTES))
        .build()
}

fn session_cookie(session_id: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// GET /login: start a new authorization-code flow.
pub async fn login(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> Result<(SignedCookieJar, Response), AuthError> {
    let oauth_state = identity::generate_state();
    let verifier = identity::generate_verifier();
    let challenge = identity::compute_challenge(&verifier);
    let url = identity::build_authorization_url(&state.oauth, &oauth_state, &challenge)
        .map_err(|e| AuthError::Internal(e.to_string()))?;

    let jar = jar
        .add(flow_cookie(STATE_COOKIE, oauth_state, state.secure_cookies))
        .add(flow_cookie(VERIFIER_COOKIE, verifier, state.secure_cookies));

    Ok((jar, found(&url)))
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /auth/callback: provider redirect target.
///
/// Any failure leaves the session store untouched.
pub async fn callback(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(SignedCookieJar, Response), AuthError> {
    let session_id = match complete_sign_in(&state, &jar, params).await {
        Ok(id) => id,
        Err(e) => {
            metrics::record_login(match &e {
                AuthError::InvalidState => "invalid_state",
                AuthError::AuthorizationDenied(_) => "denied",
                _ => "token_error",
            });
            return Err(e);
        }
    };
    metrics::record_login("success");
    metrics::set_sessions_active(state.sessions.len().await);

    let jar = jar
        .add(session_cookie(session_id, state.secure_cookies))
        .remove(Cookie::build(STATE_COOKIE).path(FLOW_COOKIE_PATH))
        .remove(Cookie::build(VERIFIER_COOKIE).path(FLOW_COOKIE_PATH));
    Ok((jar, found("/")))
}

async fn complete_sign_in(
    state: &AppState,
    jar: &SignedCookieJar,
    params: CallbackParams,
) -> Result<String, AuthError> {
    if let Some(error) = params.error {
        let description = params
            .error_description
            .unwrap_or_else(|| String::from("no description"));
        return Err(AuthError::AuthorizationDenied(format!("{error}: {description}")));
    }

    let expected = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
    match (params.state.as_deref(), expected.as_deref()) {
        (Some(received), Some(expected)) if received == expected => {}
        _ => return Err(AuthError::InvalidState),
    }
    let verifier = jar
        .get(VERIFIER_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or(AuthError::InvalidState)?;

    let code = params.code.ok_or_else(|| {
        AuthError::AuthorizationDenied("provider returned no authorization code".into())
    })?;

    let credential = AuthorizationCodeCredential::redeem(
        state.http.clone(),
        (*state.oauth).clone(),
        &code,
        Some(&verifier),
    )
    .await
    .map_err(|e| AuthError::TokenExchange(e.to_string()))?;
    let credential: Arc<dyn TokenCredential> = Arc::new(credential);

    let user_name = match state.drive_client(credential.clone()).get_user_display_name().await {
        Ok(name) => name,
        Err(e) => {
            warn!(error = %e, "profile lookup failed, using fallback name");
            FALLBACK_USER_NAME.to_string()
        }
    };

    let session_id = state.sessions.create(credential, user_name).await;
    info!(session_id = %session_id, "sign-in complete");
    Ok(session_id)
}

/// GET /logout: forget the session and clear its cookie.
pub async fn logout(
    State(state): State<AppState>,
    jar: SignedCookieJar,
) -> (SignedCookieJar, Response) {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if state.sessions.remove(cookie.value()).await.is_some() {
            info!(session_id = %cookie.value(), "signed out");
        }
        metrics::set_sessions_active(state.sessions.len().await);
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, found("/"))
}

/// A request carrying a signed `sid` cookie that names a live session.
///
/// Rejects with `AuthError::Unauthenticated`, which redirects to `/login`.
pub struct Authenticated {
    pub session_id: String,
    pub record: SessionRecord,
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar: SignedCookieJar<Key> = SignedCookieJar::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthError::Unauthenticated)?;

        let session_id = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or(AuthError::Unauthenticated)?;

        let record = state
            .sessions
            .get(&session_id)
            .await
            .ok_or(AuthError::Unauthenticated)?;

        Ok(Self { session_id, record })
    }
}
