//! Types for torrent client operations.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metainfo::{FileEntry, InfoHash};

/// Errors from a client adapter.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Client API error: {0}")]
    ApiError(String),
}

/// A torrent the client reports seeding or downloading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientTorrent {
    pub info_hash: InfoHash,
    pub name: String,
    pub files: Vec<FileEntry>,
    pub trackers: Vec<String>,
    /// Content directory on disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_path: Option<String>,
    /// Download progress (0.0 - 1.0).
    pub progress: f64,
}

/// Request to inject a torrent against existing data.
#[derive(Debug, Clone)]
pub struct InjectRequest {
    /// Raw `.torrent` bytes.
    pub torrent: Vec<u8>,
    /// Display name, for logging.
    pub name: String,
    /// Directory the client should find the data in. `None` leaves the
    /// client's default save path in charge.
    pub data_path: Option<PathBuf>,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

/// Outcome of an injection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectStatus {
    Added,
    /// The client already has this info-hash.
    Conflict,
}

/// Result of a successful `add_torrent` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectResult {
    pub status: InjectStatus,
    /// Client-side identifier of the torrent, when the adapter has one.
    pub client_torrent_id: Option<String>,
}

/// Capability set the action dispatcher consumes.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Add a torrent. Returns `Conflict` if the client already has the
    /// info-hash; piece verification is the client's job.
    async fn add_torrent(&self, request: InjectRequest) -> Result<InjectResult, ClientError>;

    /// List all torrents the client knows, including their file lists.
    async fn get_torrents(&self) -> Result<Vec<ClientTorrent>, ClientError>;

    /// Whether the client already has a torrent with this info-hash.
    async fn check_exists(&self, info_hash: &InfoHash) -> Result<bool, ClientError>;
}
