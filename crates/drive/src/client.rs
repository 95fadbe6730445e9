//! Microsoft Graph drive client
//!
//! Every call asks the credential for a bearer token first; renewal is the
//! credential's business. Responses are never cached and paginated collections
//! are read from their first page only.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use identity::TokenCredential;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::models::{
    DriveItemInfo, FolderInfo, GraphErrorBody, GraphId, GraphItem, GraphList, GraphSite, GraphUser,
    SiteInfo,
};

/// Graph v1.0 endpoint.
pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

pub struct DriveClient {
    http: reqwest::Client,
    base_url: String,
    credential: Arc<dyn TokenCredential>,
    scopes: Vec<String>,
}

impl DriveClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        credential: Arc<dyn TokenCredential>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            credential,
            scopes,
        }
    }

    /// Signed-in user's display name (`GET /me`).
    pub async fn get_user_display_name(&self) -> Result<String> {
        let user: GraphUser = self.get_json(&["me"]).await?;
        user.display_name
            .ok_or_else(|| Error::NotFound("user profile has no display name".into()))
    }

    /// SharePoint sites the user follows.
    pub async fn list_followed_sites(&self) -> Result<Vec<SiteInfo>> {
        let list: GraphList<GraphSite> = self.get_json(&["me", "followedSites"]).await?;
        Ok(list.value.into_iter().filter_map(GraphSite::into_info).collect())
    }

    pub async fn get_my_drive_id(&self) -> Result<String> {
        let drive: GraphId = self.get_json(&["me", "drive"]).await?;
        drive
            .id
            .ok_or_else(|| Error::NotFound("user has no OneDrive".into()))
    }

    pub async fn get_site_default_drive_id(&self, site_id: &str) -> Result<String> {
        let drive: GraphId = self.get_json(&["sites", site_id, "drive"]).await?;
        drive
            .id
            .ok_or_else(|| Error::NotFound(format!("default drive not found for site {site_id}")))
    }

    /// Resolve `hostname` + server-relative `site_path` (e.g.
    /// `contoso.sharepoint.com`, `/sites/Marketing`) to the site's default
    /// document library.
    pub async fn get_site_drive_id(&self, hostname: &str, site_path: &str) -> Result<String> {
        let host = format!("{hostname}:");
        let mut segments = vec!["sites", host.as_str()];
        segments.extend(path_components(site_path));
        let site: GraphId = self.get_json(&segments).await?;
        let site_id = site
            .id
            .ok_or_else(|| Error::NotFound(format!("site not found: {hostname}:{site_path}")))?;
        debug!(site_id = %site_id, "resolved site");
        self.get_site_default_drive_id(&site_id).await
    }

    /// Children of `folder_id`, or of the drive root when `None`.
    pub async fn list_items(
        &self,
        drive_id: &str,
        folder_id: Option<&str>,
    ) -> Result<Vec<DriveItemInfo>> {
        let folder = folder_id.unwrap_or("root");
        let list: GraphList<GraphItem> = self
            .get_json(&["drives", drive_id, "items", folder, "children"])
            .await?;
        Ok(list.value.into_iter().filter_map(GraphItem::into_info).collect())
    }

    /// Children of the folder at `path` relative to the drive root.
    pub async fn list_items_by_path(
        &self,
        drive_id: &str,
        path: &str,
    ) -> Result<Vec<DriveItemInfo>> {
        let components: Vec<&str> = path_components(path).collect();
        let Some((last, parents)) = components.split_last() else {
            return self.list_items(drive_id, None).await;
        };

        // root:/a/b: addresses the item at a/b
        let last = format!("{last}:");
        let mut segments = vec!["drives", drive_id, "root:"];
        segments.extend(parents.iter().copied());
        segments.push(&last);

        let folder: GraphItem = self.get_json(&segments).await?;
        let folder = folder
            .into_info()
            .filter(|item| item.is_folder)
            .ok_or_else(|| Error::NotFound(format!("folder not found at path: {path}")))?;
        self.list_items(drive_id, Some(&folder.id)).await
    }

    pub async fn get_item(&self, drive_id: &str, item_id: &str) -> Result<DriveItemInfo> {
        let item: GraphItem = self.get_json(&["drives", drive_id, "items", item_id]).await?;
        item.into_info()
            .ok_or_else(|| Error::NotFound(format!("item not found: {item_id}")))
    }

    /// Folder metadata plus its immediate children.
    pub async fn get_folder_info(&self, drive_id: &str, folder_id: &str) -> Result<FolderInfo> {
        let folder = self.get_item(drive_id, folder_id).await?;
        let children = self.list_items(drive_id, Some(folder_id)).await?;
        Ok(FolderInfo {
            id: folder.id,
            name: folder.name,
            web_url: folder.web_url,
            children,
        })
    }

    /// Whole file content in memory.
    pub async fn download_content(&self, drive_id: &str, item_id: &str) -> Result<Vec<u8>> {
        let url = self.url(&["drives", drive_id, "items", item_id, "content"])?;
        let response = self.send(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Http(format!("failed to read content of {item_id}: {e}")))?;
        Ok(bytes.to_vec())
    }

    /// Download an item to `destination`.
    ///
    /// An existing directory keeps the remote file name inside it; any other
    /// path is used as-is. Parent directories are created and an existing
    /// file is overwritten. Returns the path written.
    pub async fn download_file(
        &self,
        drive_id: &str,
        item_id: &str,
        destination: &Path,
    ) -> Result<PathBuf> {
        let is_dir = tokio::fs::metadata(destination)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if is_dir {
            let item = self.get_item(drive_id, item_id).await?;
            return self.download_item_into(drive_id, &item, destination).await;
        }
        self.write_content(drive_id, item_id, destination).await?;
        Ok(destination.to_path_buf())
    }

    /// Download an already-listed item into `dir` under its remote name.
    pub async fn download_item_into(
        &self,
        drive_id: &str,
        item: &DriveItemInfo,
        dir: &Path,
    ) -> Result<PathBuf> {
        let target = dir.join(local_file_name(&item.name)?);
        self.write_content(drive_id, &item.id, &target).await?;
        Ok(target)
    }

    /// Stream the item into a `.part` sibling of `target`, then rename it
    /// over `target`. An interrupted transfer leaves `target` as it was.
    async fn write_content(&self, drive_id: &str, item_id: &str, target: &Path) -> Result<u64> {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let url = self.url(&["drives", drive_id, "items", item_id, "content"])?;
        let response = self.send(url).await?;

        let partial = partial_path(target);
        let written = match stream_to_file(response, &partial, item_id).await {
            Ok(written) => written,
            Err(e) => {
                discard_partial(&partial).await;
                return Err(e);
            }
        };
        if let Err(e) = tokio::fs::rename(&partial, target).await {
            discard_partial(&partial).await;
            return Err(e.into());
        }

        info!(item_id, path = %target.display(), bytes = written, "file downloaded");
        Ok(written)
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Http(format!("invalid Graph base URL {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| {
                Error::Http(format!("Graph base URL cannot take a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.url(segments)?;
        let path = url.path().to_string();
        let response = self.send(url).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Decode(format!("{path}: {e}")))
    }

    /// Authorized GET; non-success statuses become `Error::Api`.
    async fn send(&self, url: Url) -> Result<reqwest::Response> {
        let token = self.credential.get_token(&self.scopes).await?;
        debug!(path = url.path(), credential = self.credential.name(), "graph request");

        let response = self
            .http
            .get(url)
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(api_error(status.as_u16(), &body))
    }
}

fn api_error(status: u16, body: &str) -> Error {
    match serde_json::from_str::<GraphErrorBody>(body) {
        Ok(parsed) => Error::Api {
            status,
            code: parsed.error.code,
            message: parsed.error.message,
        },
        Err(_) => Error::Api {
            status,
            code: String::from("unknown"),
            message: body.chars().take(200).collect(),
        },
    }
}

async fn stream_to_file(
    mut response: reqwest::Response,
    path: &Path,
    item_id: &str,
) -> Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| Error::Http(format!("download of {item_id} interrupted: {e}")))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// `report.txt` -> `report.txt.part`
fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    target.with_file_name(name)
}

async fn discard_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove partial download");
        }
    }
}

fn path_components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|c| !c.is_empty())
}

/// Reject remote names that would escape the target directory.
fn local_file_name(name: &str) -> Result<&str> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("refusing to write remote item named {name:?}"),
        ))),
    }
}
