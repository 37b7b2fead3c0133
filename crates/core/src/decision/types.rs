//! Types for the decision cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RetentionConfig;
use crate::metainfo::InfoHash;

/// Errors from the decision store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration failed at version {version}: {message}")]
    Migration { version: i64, message: String },

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// The matcher's verdict for a `(searchee, candidate)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Match,
    MatchPartial,
    MatchSizeOnly,
    NoMatch,
    InfoHashAlreadyExists,
    SizeMismatch,
    FileTreeMismatch,
    RateLimited,
    DownloadFailed,
}

impl Decision {
    /// Stable tag persisted in decision rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Match => "MATCH",
            Decision::MatchPartial => "MATCH_PARTIAL",
            Decision::MatchSizeOnly => "MATCH_SIZE_ONLY",
            Decision::NoMatch => "NO_MATCH",
            Decision::InfoHashAlreadyExists => "INFO_HASH_ALREADY_EXISTS",
            Decision::SizeMismatch => "SIZE_MISMATCH",
            Decision::FileTreeMismatch => "FILE_TREE_MISMATCH",
            Decision::RateLimited => "RATE_LIMITED",
            Decision::DownloadFailed => "DOWNLOAD_FAILED",
        }
    }

    pub fn from_str_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "MATCH" => Decision::Match,
            "MATCH_PARTIAL" => Decision::MatchPartial,
            "MATCH_SIZE_ONLY" => Decision::MatchSizeOnly,
            "NO_MATCH" => Decision::NoMatch,
            "INFO_HASH_ALREADY_EXISTS" => Decision::InfoHashAlreadyExists,
            "SIZE_MISMATCH" => Decision::SizeMismatch,
            "FILE_TREE_MISMATCH" => Decision::FileTreeMismatch,
            "RATE_LIMITED" => Decision::RateLimited,
            "DOWNLOAD_FAILED" => Decision::DownloadFailed,
            _ => return None,
        })
    }

    /// Verdicts that hand the candidate to the action dispatcher.
    pub fn is_accepted(&self) -> bool {
        matches!(
            self,
            Decision::Match | Decision::MatchPartial | Decision::MatchSizeOnly
        )
    }
}

/// Key of a decision row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    pub searchee_name: String,
    pub indexer_id: String,
    pub guid: String,
}

impl DecisionKey {
    pub fn new(
        searchee_name: impl Into<String>,
        indexer_id: impl Into<String>,
        guid: impl Into<String>,
    ) -> Self {
        Self {
            searchee_name: searchee_name.into(),
            indexer_id: indexer_id.into(),
            guid: guid.into(),
        }
    }
}

/// A persisted decision row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRecord {
    pub key: DecisionKey,
    pub decision: Decision,
    /// Present for accepted decisions.
    pub info_hash: Option<InfoHash>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl DecisionRecord {
    /// Whether this cached verdict still short-circuits a fresh decision.
    ///
    /// DOWNLOAD_FAILED and RATE_LIMITED rows record a transient condition
    /// and age out after the configured recheck window; other negative rows
    /// age out only when `expire_negative_secs` is set. Accepted rows are
    /// always binding.
    pub fn is_binding(&self, retention: &RetentionConfig, now: DateTime<Utc>) -> bool {
        let age_secs = (now - self.last_seen).num_seconds().max(0) as u64;
        match self.decision {
            Decision::DownloadFailed | Decision::RateLimited => {
                age_secs < retention.download_failed_recheck_secs
            }
            d if d.is_accepted() => true,
            _ => retention.expire_negative_secs == 0 || age_secs < retention.expire_negative_secs,
        }
    }
}

/// Per-searchee search bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearcheeTimestamp {
    pub first_searched: Option<DateTime<Utc>>,
    pub last_searched: Option<DateTime<Utc>>,
}

/// A persisted indexer row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexerRow {
    pub id: String,
    pub url: String,
    pub active: bool,
    pub disabled_until: Option<DateTime<Utc>>,
    /// Capability document as JSON, cached from the last probe.
    pub caps_json: Option<String>,
}

/// A persisted job status row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobStatusRow {
    pub name: String,
    pub kind: String,
    pub status: String,
    pub detail: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Persistent store for decisions, search timestamps, indexers, and jobs.
///
/// Implementations support concurrent readers with serialized writers.
pub trait DecisionStore: Send + Sync {
    /// Upsert a decision. Existing rows keep `first_seen` and update the
    /// verdict, info-hash, and `last_seen`.
    fn record_decision(
        &self,
        key: &DecisionKey,
        decision: Decision,
        info_hash: Option<InfoHash>,
    ) -> Result<(), StoreError>;

    fn has_decision(&self, key: &DecisionKey) -> Result<Option<DecisionRecord>, StoreError>;

    /// Ensure a searchee has a timestamp row so the scheduler can find it.
    fn ensure_searchee(&self, searchee_name: &str) -> Result<(), StoreError>;

    fn mark_searched(&self, searchee_name: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    fn searchee_timestamp(
        &self,
        searchee_name: &str,
    ) -> Result<Option<SearcheeTimestamp>, StoreError>;

    /// The searchee most overdue for a search: never-searched first, then
    /// oldest `last_searched`, provided `last_searched + cadence < now`.
    fn next_due_searchee(
        &self,
        now: DateTime<Utc>,
        cadence_secs: u64,
    ) -> Result<Option<String>, StoreError>;

    fn upsert_indexer(&self, row: &IndexerRow) -> Result<(), StoreError>;

    fn get_indexer(&self, id: &str) -> Result<Option<IndexerRow>, StoreError>;

    fn replace_indexer_categories(
        &self,
        indexer_id: &str,
        categories: &[(i64, String)],
    ) -> Result<(), StoreError>;

    fn set_job_status(
        &self,
        name: &str,
        kind: &str,
        status: &str,
        detail: Option<&str>,
    ) -> Result<(), StoreError>;

    fn list_job_status(&self) -> Result<Vec<JobStatusRow>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_decision_tag_roundtrip() {
        for decision in [
            Decision::Match,
            Decision::MatchPartial,
            Decision::MatchSizeOnly,
            Decision::NoMatch,
            Decision::InfoHashAlreadyExists,
            Decision::SizeMismatch,
            Decision::FileTreeMismatch,
            Decision::RateLimited,
            Decision::DownloadFailed,
        ] {
            assert_eq!(Decision::from_str_tag(decision.as_str()), Some(decision));
        }
        assert_eq!(Decision::from_str_tag("BOGUS"), None);
    }

    #[test]
    fn test_is_accepted() {
        assert!(Decision::Match.is_accepted());
        assert!(Decision::MatchPartial.is_accepted());
        assert!(Decision::MatchSizeOnly.is_accepted());
        assert!(!Decision::SizeMismatch.is_accepted());
        assert!(!Decision::DownloadFailed.is_accepted());
    }

    fn record(decision: Decision, age_secs: i64, now: DateTime<Utc>) -> DecisionRecord {
        DecisionRecord {
            key: DecisionKey::new("s", "i", "g"),
            decision,
            info_hash: None,
            first_seen: now - Duration::seconds(age_secs),
            last_seen: now - Duration::seconds(age_secs),
        }
    }

    #[test]
    fn test_download_failed_rechecks_after_window() {
        let now = Utc::now();
        let retention = RetentionConfig::default();
        assert!(record(Decision::DownloadFailed, 60, now).is_binding(&retention, now));
        assert!(!record(Decision::DownloadFailed, 3601, now).is_binding(&retention, now));
    }

    #[test]
    fn test_rate_limited_rechecks_like_download_failed() {
        let now = Utc::now();
        let retention = RetentionConfig::default();
        assert!(record(Decision::RateLimited, 60, now).is_binding(&retention, now));
        assert!(!record(Decision::RateLimited, 3601, now).is_binding(&retention, now));
    }

    #[test]
    fn test_negative_decisions_never_expire_by_default() {
        let now = Utc::now();
        let retention = RetentionConfig::default();
        assert!(record(Decision::SizeMismatch, 10_000_000, now).is_binding(&retention, now));
    }

    #[test]
    fn test_negative_decisions_expire_when_configured() {
        let now = Utc::now();
        let retention = RetentionConfig {
            expire_negative_secs: 100,
            ..Default::default()
        };
        assert!(record(Decision::SizeMismatch, 50, now).is_binding(&retention, now));
        assert!(!record(Decision::SizeMismatch, 150, now).is_binding(&retention, now));
        // Accepted rows do not expire.
        assert!(record(Decision::Match, 150, now).is_binding(&retention, now));
    }
}
