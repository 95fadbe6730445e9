//! Download every file in one SharePoint folder

use std::path::PathBuf;

use drive::DriveClient;
use identity::CredentialChain;
use tracing::{debug, info};

use crate::config::Config;

#[derive(Debug, Default)]
pub struct Summary {
    pub downloaded: Vec<PathBuf>,
    pub skipped_folders: usize,
}

/// Acquire a credential from `chain`, resolve the site's library, and copy the
/// files directly inside `config.folder_path` into `config.download_dir`.
///
/// Subfolders are skipped. Existing files with the same name are overwritten,
/// so repeated runs leave one copy of each file.
pub async fn run(
    config: &Config,
    chain: &CredentialChain,
    http: reqwest::Client,
) -> drive::Result<Summary> {
    let scopes = vec![identity::GRAPH_DEFAULT_SCOPE.to_string()];
    let credential = chain.acquire(&scopes).await?;
    let client = DriveClient::new(http, config.graph_base_url.clone(), credential, scopes);

    let drive_id = client
        .get_site_drive_id(&config.hostname, &config.site_path)
        .await?;
    info!(drive_id = %drive_id, site = %config.site_path, "resolved document library");

    let items = client.list_items_by_path(&drive_id, &config.folder_path).await?;
    let (files, folders): (Vec<_>, Vec<_>) = items.into_iter().partition(|item| item.is_file());

    let mut summary = Summary {
        skipped_folders: folders.len(),
        ..Summary::default()
    };
    for folder in &folders {
        debug!(name = %folder.name, "skipping folder");
    }
    if files.is_empty() {
        info!(folder = %config.folder_path, "nothing to download");
        return Ok(summary);
    }

    tokio::fs::create_dir_all(&config.download_dir).await?;
    for item in &files {
        let path = client
            .download_item_into(&drive_id, item, &config.download_dir)
            .await?;
        info!(name = %item.name, path = %path.display(), "downloaded");
        summary.downloaded.push(path);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode, Uri, header};
    use axum::response::IntoResponse;
    use identity::{AccessToken, CredentialSource, TokenCredential, TokenFuture};
    use identity::chain::SourceFuture;
    use std::path::Path;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    struct FixedCredential;

    impl TokenCredential for FixedCredential {
        fn name(&self) -> &str {
            "fixed"
        }

        fn get_token<'a>(&'a self, _scopes: &'a [String]) -> TokenFuture<'a> {
            Box::pin(async { Ok(AccessToken::new("app-token".into(), u64::MAX / 2)) })
        }
    }

    struct FixedSource;

    impl CredentialSource for FixedSource {
        fn name(&self) -> &str {
            "fixed"
        }

        fn try_acquire<'a>(&'a self, _scopes: &'a [String]) -> SourceFuture<'a> {
            Box::pin(async { Some(Arc::new(FixedCredential) as Arc<dyn TokenCredential>) })
        }
    }

    fn chain() -> CredentialChain {
        CredentialChain::new(vec![Box::new(FixedSource)])
    }

    /// Site `contoso.sharepoint.com:/sites/Team` with drive `drv`. `General`
    /// holds three files and one subfolder; `Empty` holds only a subfolder.
    async fn start_graph_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let app = axum::Router::new().fallback(|uri: Uri, headers: HeaderMap| async move {
                if headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok())
                    != Some("Bearer app-token")
                {
                    return (StatusCode::UNAUTHORIZED, "bad token").into_response();
                }
                let file = |id: &str| {
                    let name = format!("{id}.txt");
                    serde_json::json!({"id": id, "name": name, "size": 9, "file": {}})
                };
                let folder = |id: &str, name: &str| {
                    serde_json::json!({"id": id, "name": name, "folder": {}})
                };
                let path = uri.path();
                if let Some(id) = path
                    .strip_prefix("/v1.0/drives/drv/items/")
                    .and_then(|rest| rest.strip_suffix("/content"))
                {
                    return format!("content of {id}").into_response();
                }
                let body = match path {
                    "/v1.0/sites/contoso.sharepoint.com:/sites/Team" => {
                        serde_json::json!({"id": "site-1"})
                    }
                    "/v1.0/sites/site-1/drive" => serde_json::json!({"id": "drv"}),
                    "/v1.0/drives/drv/root:/General:" => folder("gen", "General"),
                    "/v1.0/drives/drv/root:/Empty:" => folder("empty", "Empty"),
                    "/v1.0/drives/drv/items/gen/children" => serde_json::json!({"value": [
                        file("a"), file("b"), folder("sub", "Archive"), file("c")
                    ]}),
                    "/v1.0/drives/drv/items/empty/children" => serde_json::json!({"value": [
                        folder("sub2", "Nested")
                    ]}),
                    _ => {
                        return (
                            StatusCode::NOT_FOUND,
                            axum::Json(serde_json::json!({
                                "error": {
                                    "code": "itemNotFound",
                                    "message": "The resource could not be found."
                                }
                            })),
                        )
                            .into_response();
                    }
                };
                axum::Json(body).into_response()
            });
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1.0")
    }

    fn config(graph: &str, folder: &str, dir: &Path) -> Config {
        Config {
            hostname: "contoso.sharepoint.com".into(),
            site_path: "/sites/Team".into(),
            folder_path: folder.into(),
            download_dir: dir.to_path_buf(),
            graph_base_url: graph.into(),
        }
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn downloads_each_file_once_and_skips_folders() {
        let graph = start_graph_server().await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("downloads");

        let summary = run(&config(&graph, "General", &target), &chain(), reqwest::Client::new())
            .await
            .unwrap();

        assert_eq!(summary.downloaded.len(), 3);
        assert_eq!(summary.skipped_folders, 1);
        assert_eq!(file_names(&target), vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(std::fs::read_to_string(target.join("b.txt")).unwrap(), "content of b");
    }

    #[tokio::test]
    async fn rerun_overwrites_instead_of_duplicating() {
        let graph = start_graph_server().await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "stale local copy").unwrap();
        let config = config(&graph, "General", dir.path());

        run(&config, &chain(), reqwest::Client::new()).await.unwrap();
        run(&config, &chain(), reqwest::Client::new()).await.unwrap();

        assert_eq!(file_names(dir.path()), vec!["a.txt", "b.txt", "c.txt"]);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "content of a");
    }

    #[tokio::test]
    async fn folder_without_files_is_success() {
        let graph = start_graph_server().await;
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("never-created");

        let summary = run(&config(&graph, "Empty", &target), &chain(), reqwest::Client::new())
            .await
            .unwrap();

        assert!(summary.downloaded.is_empty());
        assert_eq!(summary.skipped_folders, 1);
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn exhausted_chain_fails_before_any_remote_call() {
        let dir = tempfile::tempdir().unwrap();
        let empty = CredentialChain::new(vec![]);

        let err = run(
            &config("http://127.0.0.1:1/v1.0", "General", dir.path()),
            &empty,
            reqwest::Client::new(),
        )
        .await
        .unwrap_err();

        assert!(
            matches!(err, drive::Error::Auth(identity::Error::ChainExhausted(_))),
            "got: {err:?}"
        );
        assert!(file_names(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn unknown_folder_is_a_remote_error() {
        let graph = start_graph_server().await;
        let dir = tempfile::tempdir().unwrap();

        let err = run(&config(&graph, "Missing", dir.path()), &chain(), reqwest::Client::new())
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(404));
        assert!(file_names(dir.path()).is_empty());
    }
}
