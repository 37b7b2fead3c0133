//! qBittorrent Web API v2 adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::QBittorrentConfig;
use crate::metainfo::{FileEntry, InfoHash};

use super::types::{
    ClientError, ClientTorrent, InjectRequest, InjectResult, InjectStatus, TorrentClient,
};

/// qBittorrent client. Session cookies live in the reqwest cookie jar and
/// are refreshed when the API answers 403.
pub struct QBittorrentClient {
    client: Client,
    config: QBittorrentConfig,
    authenticated: RwLock<bool>,
}

impl QBittorrentClient {
    pub fn new(config: QBittorrentConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            config,
            authenticated: RwLock::new(false),
        }
    }

    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    async fn login(&self) -> Result<(), ClientError> {
        let url = format!("{}/api/v2/auth/login", self.base_url());
        let params = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.as_str()),
        ];

        let response = self
            .client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(map_reqwest_err)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if body.contains("Ok.") {
            debug!("qBittorrent login successful");
            *self.authenticated.write().await = true;
            Ok(())
        } else if body.contains("Fails.") || status.as_u16() == 403 {
            Err(ClientError::AuthenticationFailed(
                "Invalid credentials".to_string(),
            ))
        } else {
            Err(ClientError::AuthenticationFailed(format!(
                "Unexpected response: {}",
                body.chars().take(100).collect::<String>()
            )))
        }
    }

    async fn ensure_authenticated(&self) -> Result<(), ClientError> {
        if *self.authenticated.read().await {
            return Ok(());
        }
        self.login().await
    }

    /// Authenticated GET with one re-login retry on session expiry.
    async fn get_text(&self, endpoint: &str) -> Result<String, ClientError> {
        self.ensure_authenticated().await?;

        let url = format!("{}{}", self.base_url(), endpoint);
        let response = self.client.get(&url).send().await.map_err(map_reqwest_err)?;

        if response.status().as_u16() == 403 {
            *self.authenticated.write().await = false;
            self.login().await?;
            let retry = self.client.get(&url).send().await.map_err(map_reqwest_err)?;
            return read_ok_body(retry).await;
        }
        read_ok_body(response).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> Result<T, ClientError> {
        let body = self.get_text(endpoint).await?;
        serde_json::from_str(&body).map_err(|e| ClientError::ApiError(e.to_string()))
    }
}

async fn read_ok_body(response: reqwest::Response) -> Result<String, ClientError> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(ClientError::ApiError(format!(
            "HTTP {}: {}",
            status,
            body.chars().take(200).collect::<String>()
        )));
    }
    Ok(body)
}

fn map_reqwest_err(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else if e.is_connect() {
        ClientError::ConnectionFailed(e.to_string())
    } else {
        ClientError::ApiError(e.to_string())
    }
}

#[async_trait]
impl TorrentClient for QBittorrentClient {
    fn name(&self) -> &str {
        "qbittorrent"
    }

    async fn add_torrent(&self, request: InjectRequest) -> Result<InjectResult, ClientError> {
        self.ensure_authenticated().await?;

        // The add endpoint reports duplicate hashes with a bare "Fails.",
        // so the conflict check happens up front where it is unambiguous.
        let meta = crate::metainfo::parse(&request.torrent)
            .map_err(|e| ClientError::ApiError(format!("unparseable torrent payload: {e}")))?;
        if self.check_exists(&meta.info_hash).await? {
            return Ok(InjectResult {
                status: InjectStatus::Conflict,
                client_torrent_id: None,
            });
        }

        let mut form = multipart::Form::new().part(
            "torrents",
            multipart::Part::bytes(request.torrent.clone())
                .file_name(format!("{}.torrent", request.name))
                .mime_str("application/x-bittorrent")
                .map_err(|e| ClientError::ApiError(e.to_string()))?,
        );
        if let Some(data_path) = &request.data_path {
            form = form
                .text("savepath", data_path.display().to_string())
                .text("autoTMM", "false");
        }
        if let Some(category) = &request.category {
            form = form.text("category", category.clone());
        }
        if !request.tags.is_empty() {
            form = form.text("tags", request.tags.join(","));
        }

        let url = format!("{}/api/v2/torrents/add", self.base_url());
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(map_reqwest_err)?;
        let body = read_ok_body(response).await?;

        if body.contains("Fails.") {
            // Lost the race with another add of the same hash.
            if self.check_exists(&meta.info_hash).await? {
                return Ok(InjectResult {
                    status: InjectStatus::Conflict,
                    client_torrent_id: None,
                });
            }
            return Err(ClientError::ApiError("add rejected".to_string()));
        }

        Ok(InjectResult {
            status: InjectStatus::Added,
            client_torrent_id: Some(meta.info_hash.to_hex()),
        })
    }

    async fn get_torrents(&self) -> Result<Vec<ClientTorrent>, ClientError> {
        let infos: Vec<QbTorrentInfo> = self.get_json("/api/v2/torrents/info").await?;

        let mut torrents = Vec::with_capacity(infos.len());
        for info in infos {
            let Ok(info_hash) = InfoHash::from_hex(&info.hash) else {
                continue;
            };
            let files: Vec<QbTorrentFile> = self
                .get_json(&format!("/api/v2/torrents/files?hash={}", info.hash))
                .await?;
            let trackers: Vec<QbTracker> = self
                .get_json(&format!("/api/v2/torrents/trackers?hash={}", info.hash))
                .await?;

            torrents.push(ClientTorrent {
                info_hash,
                name: info.name,
                files: files
                    .into_iter()
                    .map(|f| FileEntry::new(f.name, f.size))
                    .collect(),
                trackers: trackers
                    .into_iter()
                    .map(|t| t.url)
                    .filter(|u| u.starts_with("http") || u.starts_with("udp"))
                    .collect(),
                save_path: Some(info.save_path),
                progress: info.progress,
            });
        }
        Ok(torrents)
    }

    async fn check_exists(&self, info_hash: &InfoHash) -> Result<bool, ClientError> {
        let infos: Vec<QbTorrentInfo> = self
            .get_json(&format!("/api/v2/torrents/info?hashes={}", info_hash.to_hex()))
            .await?;
        Ok(!infos.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct QbTorrentInfo {
    hash: String,
    name: String,
    save_path: String,
    progress: f64,
}

#[derive(Debug, Deserialize)]
struct QbTorrentFile {
    name: String,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct QbTracker {
    url: String,
}
