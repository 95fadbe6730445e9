//! JSON API for the browser: `/api/me`, `/api/sites`, `/api/files`
//!
//! Every handler builds a `DriveClient` around the session's credential and
//! queries Graph directly. Nothing is cached between requests.

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use tracing::debug;

use crate::AppState;
use crate::auth::Authenticated;
use crate::error::ApiError;

/// GET /api/me: display name captured at sign-in.
pub async fn me(auth: Authenticated) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "name": auth.record.user_name }))
}

/// GET /api/sites: SharePoint sites the user follows.
pub async fn sites(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<Vec<drive::SiteInfo>>, ApiError> {
    let client = state.drive_client(auth.record.credential);
    Ok(Json(client.list_followed_sites().await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct FilesQuery {
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    drive_id: Option<String>,
    #[serde(default)]
    site_id: Option<String>,
}

/// Empty query values count as absent.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// GET /api/files: folder listing.
///
/// Drive: explicit `drive_id`, else the default library of `site_id`, else the
/// user's own OneDrive. Folder: `path` relative to the drive root, else the root.
pub async fn files(
    State(state): State<AppState>,
    auth: Authenticated,
    Query(query): Query<FilesQuery>,
) -> Result<Json<Vec<drive::DriveItemInfo>>, ApiError> {
    let client = state.drive_client(auth.record.credential);

    let drive_id = match (non_empty(query.drive_id), non_empty(query.site_id)) {
        (Some(drive_id), _) => drive_id,
        (None, Some(site_id)) => client.get_site_default_drive_id(&site_id).await?,
        (None, None) => client.get_my_drive_id().await?,
    };
    debug!(session_id = %auth.session_id, drive_id = %drive_id, "listing files");

    let items = match non_empty(query.path) {
        Some(path) => client.list_items_by_path(&drive_id, &path).await?,
        None => client.list_items(&drive_id, None).await?,
    };
    Ok(Json(items))
}
