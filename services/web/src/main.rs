//! Drive Browser
//!
//! Web front end that:
//! 1. Signs users in with the authorization-code flow (`/login`, `/auth/callback`)
//! 2. Keeps each user's credential server-side, keyed by a random session id
//! 3. Lists OneDrive and SharePoint files on their behalf (`/api/*`)

mod api;
mod auth;
mod config;
mod error;
mod metrics;
mod session;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{MatchedPath, Request, State};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum_extra::extract::cookie::Key;
use identity::TokenCredential;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::session::SessionStore;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    sessions: Arc<SessionStore>,
    oauth: Arc<identity::ClientConfig>,
    http: reqwest::Client,
    graph_base_url: String,
    cookie_key: Key,
    secure_cookies: bool,
    started_at: Instant,
    prometheus: PrometheusHandle,
}

impl AppState {
    /// Graph client acting with `credential`.
    fn drive_client(&self, credential: Arc<dyn TokenCredential>) -> drive::DriveClient {
        drive::DriveClient::new(
            self.http.clone(),
            self.graph_base_url.clone(),
            credential,
            self.oauth.scopes.clone(),
        )
    }
}

/// Build the axum router with all routes and shared state.
///
/// `max_connections` caps concurrently served requests.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/logout", get(auth::logout))
        .route("/api/me", get(api::me))
        .route("/api/sites", get(api::sites))
        .route("/api/files", get(api::files))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn(track_requests))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting drive-browser");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus = metrics::install_recorder().context("failed to install metrics recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        tenant = %config.oauth.tenant_id,
        redirect_uri = %config.oauth.redirect_uri,
        graph_base_url = %config.graph.base_url,
        secure_cookies = config.secure_cookies(),
        "configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.graph.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let state = AppState {
        sessions: Arc::new(SessionStore::new()),
        oauth: Arc::new(config.client_config()),
        http,
        graph_base_url: config.graph.base_url.clone(),
        cookie_key: config.cookie_key(),
        secure_cookies: config.secure_cookies(),
        started_at: Instant::now(),
        prometheus,
    };
    metrics::set_sessions_active(0);

    let app = build_router(state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown complete");
    Ok(())
}

/// Count every request against the route template it matched.
async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| String::from("unmatched"));
    let response = next.run(request).await;
    metrics::record_request(&route, response.status().as_u16());
    response
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Health endpoint: status, live session count, uptime.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "sessions": state.sessions.len().await,
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    });
    (
        axum::http::StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint: returns metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
