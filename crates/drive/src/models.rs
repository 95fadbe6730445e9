//! Drive items and sites as the rest of the workspace sees them
//!
//! `Graph*` structs mirror the wire format and stay private to the crate;
//! `DriveItemInfo` and `SiteInfo` are what handlers serialize.

use serde::{Deserialize, Serialize};

/// File or folder metadata. Timestamps are ISO-8601 strings as returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriveItemInfo {
    pub id: String,
    pub name: String,
    pub size: Option<u64>,
    pub mime_type: Option<String>,
    pub is_folder: bool,
    pub created_at: Option<String>,
    pub modified_at: Option<String>,
    pub web_url: Option<String>,
    /// Short-lived pre-authenticated URL; kept server-side.
    #[serde(skip_serializing)]
    pub download_url: Option<String>,
}

impl DriveItemInfo {
    pub fn is_file(&self) -> bool {
        !self.is_folder
    }
}

/// Folder metadata together with its immediate children.
#[derive(Debug, Clone, Serialize)]
pub struct FolderInfo {
    pub id: String,
    pub name: String,
    pub web_url: Option<String>,
    pub children: Vec<DriveItemInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteInfo {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub web_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphList<T> {
    pub value: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphFile {
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphItem {
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub size: Option<u64>,
    pub file: Option<GraphFile>,
    pub folder: Option<serde_json::Value>,
    #[serde(rename = "createdDateTime")]
    pub created: Option<String>,
    #[serde(rename = "lastModifiedDateTime")]
    pub modified: Option<String>,
    #[serde(rename = "webUrl")]
    pub web_url: Option<String>,
    #[serde(rename = "@microsoft.graph.downloadUrl")]
    pub download_url: Option<String>,
}

impl GraphItem {
    /// `None` when Graph returned an item without an id.
    pub(crate) fn into_info(self) -> Option<DriveItemInfo> {
        Some(DriveItemInfo {
            id: self.id?,
            name: self.name,
            size: self.size,
            mime_type: self.file.and_then(|f| f.mime_type),
            is_folder: self.folder.is_some(),
            created_at: self.created,
            modified_at: self.modified,
            web_url: self.web_url,
            download_url: self.download_url,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphSite {
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    #[serde(rename = "webUrl")]
    pub web_url: Option<String>,
}

impl GraphSite {
    pub(crate) fn into_info(self) -> Option<SiteInfo> {
        let id = self.id?;
        let name = self.name.unwrap_or_default();
        Some(SiteInfo {
            display_name: self.display_name.unwrap_or_else(|| name.clone()),
            id,
            name,
            web_url: self.web_url,
        })
    }
}

/// Any object where only the id matters (`/me/drive`, `/sites/{id}/drive`).
#[derive(Debug, Deserialize)]
pub(crate) struct GraphId {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphUser {
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphErrorBody {
    pub error: GraphErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}
