//! Types for action dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::client::ClientError;
use crate::decision::{Decision, StoreError};
use crate::metainfo::TorrentMetadata;
use crate::searchee::Searchee;
use crate::torznab::Candidate;

/// Errors from dispatching an accepted match.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Hardlink from {source_path} to {dest} crosses devices and copy fallback is disabled")]
    CrossDevice { source_path: PathBuf, dest: PathBuf },

    #[error("Inject mode requires action.link_dir")]
    MissingLinkDir,

    #[error("Searchee has no on-disk content root to link from")]
    MissingContentRoot,

    #[error("No local file matches {path} ({size} bytes)")]
    UnmatchedFile { path: String, size: u64 },

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// State machine phases of one injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionPhase {
    Pending,
    Linking,
    Injecting,
    Success,
    /// The client already had the info-hash.
    Conflict,
    /// The client rejected the injection past the retry ceiling.
    ClientError,
}

impl InjectionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            InjectionPhase::Pending => "pending",
            InjectionPhase::Linking => "linking",
            InjectionPhase::Injecting => "injecting",
            InjectionPhase::Success => "success",
            InjectionPhase::Conflict => "conflict",
            InjectionPhase::ClientError => "client_error",
        }
    }
}

/// An accepted match handed from the matcher to the dispatcher.
#[derive(Debug, Clone)]
pub struct AcceptedMatch {
    pub searchee: Arc<Searchee>,
    pub candidate: Candidate,
    pub decision: Decision,
    pub metadata: TorrentMetadata,
    pub torrent_bytes: Vec<u8>,
}

/// Result of a dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub phase: InjectionPhase,
    /// Where the `.torrent` landed, in SAVE mode.
    pub saved_path: Option<PathBuf>,
    /// Injection attempts spent.
    pub attempts: u32,
}
