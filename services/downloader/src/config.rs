//! Downloader configuration, read from the environment
//!
//! | Variable                | Required | Default                  |
//! |-------------------------|----------|--------------------------|
//! | `SHAREPOINT_HOSTNAME`   | yes      |                          |
//! | `SHAREPOINT_SITE_PATH`  | yes      |                          |
//! | `ONEDRIVE_FOLDER_PATH`  | no       | drive root               |
//! | `DOWNLOAD_DIR`          | no       | `./downloads`            |
//! | `GRAPH_BASE_URL`        | no       | Graph v1.0 endpoint      |

use std::path::PathBuf;

use common::{Error, Result};

pub const DEFAULT_DOWNLOAD_DIR: &str = "./downloads";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// e.g. `contoso.sharepoint.com`
    pub hostname: String,
    /// e.g. `/sites/Engineering`
    pub site_path: String,
    /// Folder relative to the library root; empty means the root.
    pub folder_path: String,
    pub download_dir: PathBuf,
    pub graph_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| get(key).ok_or_else(|| Error::MissingEnv(key.to_string()));

        let config = Self {
            hostname: require("SHAREPOINT_HOSTNAME")?,
            site_path: require("SHAREPOINT_SITE_PATH")?,
            folder_path: get("ONEDRIVE_FOLDER_PATH").unwrap_or_default(),
            download_dir: PathBuf::from(
                get("DOWNLOAD_DIR").unwrap_or_else(|| DEFAULT_DOWNLOAD_DIR.to_string()),
            ),
            graph_base_url: get("GRAPH_BASE_URL")
                .unwrap_or_else(|| drive::GRAPH_BASE_URL.to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.hostname.contains('/') || self.hostname.contains(':') {
            return Err(Error::Config(format!(
                "SHAREPOINT_HOSTNAME must be a bare host name, got {:?}",
                self.hostname
            )));
        }
        let url = &self.graph_base_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::Config(format!(
                "GRAPH_BASE_URL must be an http(s) URL, got {:?}",
                self.graph_base_url
            )));
        }
        Ok(())
    }
}
