//! Remote file access over Microsoft Graph
//!
//! `DriveClient` wraps one `TokenCredential` and exposes the read-only calls
//! the browser and the downloader need: profile, followed sites, drive
//! resolution, folder listings and content download.

pub mod client;
pub mod error;
pub mod models;

pub use client::{DriveClient, GRAPH_BASE_URL};
pub use error::{Error, Result};
pub use models::{DriveItemInfo, FolderInfo, SiteInfo};
