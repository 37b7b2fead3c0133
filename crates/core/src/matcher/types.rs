//! Types for match adjudication.

use std::path::PathBuf;

use crate::decision::Decision;
use crate::metainfo::TorrentMetadata;
use crate::searchee::Searchee;

/// Outcome of adjudicating one `(searchee, candidate)` pair.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub decision: Decision,
    /// True when the verdict came from the decision cache; no metadata or
    /// payload accompanies a cached verdict, and accepted cached verdicts
    /// are not re-dispatched.
    pub from_cache: bool,
    /// Parsed metadata, present for freshly accepted decisions.
    pub metadata: Option<TorrentMetadata>,
    /// Raw `.torrent` payload, present for freshly accepted decisions.
    pub torrent_bytes: Option<Vec<u8>>,
}

impl MatchOutcome {
    pub fn cached(decision: Decision) -> Self {
        Self {
            decision,
            from_cache: true,
            metadata: None,
            torrent_bytes: None,
        }
    }

    pub fn rejected(decision: Decision) -> Self {
        Self {
            decision,
            from_cache: false,
            metadata: None,
            torrent_bytes: None,
        }
    }

    pub fn accepted(decision: Decision, metadata: TorrentMetadata, bytes: Vec<u8>) -> Self {
        Self {
            decision,
            from_cache: false,
            metadata: Some(metadata),
            torrent_bytes: Some(bytes),
        }
    }
}

/// Whether partial and size-only matches can be wired up for injection.
///
/// In inject mode the matched files must be hardlinkable (or copyable,
/// when permitted) from the searchee's storage into the link directory;
/// when they are not, the would-be match downgrades to NO_MATCH.
#[derive(Debug, Clone, Default)]
pub struct LinkPolicy {
    /// False in save mode, where no linking happens.
    pub inject: bool,
    pub link_dir: Option<PathBuf>,
    pub fallback_copy: bool,
}

impl LinkPolicy {
    pub fn save_mode() -> Self {
        Self::default()
    }

    /// Whether a partial/size-only match of this searchee could be linked.
    pub fn feasible_for(&self, searchee: &Searchee) -> bool {
        if !self.inject {
            return true;
        }
        let Some(root) = searchee.content_root.as_deref() else {
            // No on-disk location known; nothing to link from.
            return false;
        };
        let Some(link_dir) = self.link_dir.as_deref() else {
            return false;
        };
        match crate::action::same_device(std::path::Path::new(root), link_dir) {
            Ok(true) => true,
            Ok(false) | Err(_) => self.fallback_copy,
        }
    }
}
