//! Types for local content description.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metainfo::{FileEntry, InfoHash};

/// Errors that can occur while constructing a searchee.
#[derive(Debug, Error)]
pub enum SearcheeError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse torrent: {0}")]
    Torrent(#[from] crate::metainfo::MetainfoError),

    #[error("Directory contains no files: {0}")]
    EmptyDirectory(String),
}

/// Where a searchee was enumerated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearcheeOrigin {
    TorrentFile,
    DataDir,
    Client,
}

impl SearcheeOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearcheeOrigin::TorrentFile => "torrent_file",
            SearcheeOrigin::DataDir => "data_dir",
            SearcheeOrigin::Client => "client",
        }
    }
}

/// A local item used as the reference to find alternate sources for.
///
/// Immutable once constructed. Two searchees sharing an info-hash must have
/// identical file lists (same torrent, wherever it was enumerated from).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Searchee {
    /// Release name.
    pub name: String,
    /// Files with paths relative to the content root, in stable order.
    pub files: Vec<FileEntry>,
    /// Sum of file sizes.
    pub total_size: u64,
    /// Present iff sourced from a torrent file or a client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_hash: Option<InfoHash>,
    pub origin: SearcheeOrigin,
    /// Announce URLs already known for this content.
    #[serde(default)]
    pub trackers: BTreeSet<String>,
    /// Absolute path of the content root on disk, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_root: Option<String>,
}

impl Searchee {
    pub fn new(
        name: impl Into<String>,
        files: Vec<FileEntry>,
        info_hash: Option<InfoHash>,
        origin: SearcheeOrigin,
    ) -> Self {
        let total_size = files.iter().map(|f| f.size).sum();
        Self {
            name: name.into(),
            files,
            total_size,
            info_hash,
            origin,
            trackers: BTreeSet::new(),
            content_root: None,
        }
    }

    pub fn with_trackers(mut self, trackers: impl IntoIterator<Item = String>) -> Self {
        self.trackers = trackers.into_iter().collect();
        self
    }

    pub fn with_content_root(mut self, root: impl Into<String>) -> Self {
        self.content_root = Some(root.into());
        self
    }
}
