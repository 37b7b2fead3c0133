//! The match engine: cache consultation, metadata fetch, and verdict
//! persistence around the pure comparison core.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::{MatchConfig, RetentionConfig};
use crate::decision::{Decision, DecisionKey, DecisionStore, DecisionWriter, StoreError};
use crate::metainfo::{self, InfoHash};
use crate::searchee::Searchee;
use crate::torznab::{Candidate, MetadataFetcher, TorznabError};

use super::compare::{decide_from_metadata, size_within_fuzz};
use super::types::{LinkPolicy, MatchOutcome};

/// Adjudicates candidates against searchees.
///
/// The cache is consulted before any network I/O, and the verdict is
/// enqueued for persistence as the final step, so a cancelled decision
/// leaves no partial row.
pub struct MatchEngine {
    config: MatchConfig,
    retention: RetentionConfig,
    store: Arc<dyn DecisionStore>,
    writer: DecisionWriter,
    fetcher: Arc<dyn MetadataFetcher>,
    link_policy: LinkPolicy,
    /// Info-hashes already present locally (client torrents plus enumerated
    /// searchees).
    known_hashes: RwLock<HashSet<InfoHash>>,
}

impl MatchEngine {
    pub fn new(
        config: MatchConfig,
        retention: RetentionConfig,
        store: Arc<dyn DecisionStore>,
        writer: DecisionWriter,
        fetcher: Arc<dyn MetadataFetcher>,
        link_policy: LinkPolicy,
    ) -> Self {
        Self {
            config,
            retention,
            store,
            writer,
            fetcher,
            link_policy,
            known_hashes: RwLock::new(HashSet::new()),
        }
    }

    /// Register info-hashes that already exist locally.
    pub async fn register_known_hashes(&self, hashes: impl IntoIterator<Item = InfoHash>) {
        self.known_hashes.write().await.extend(hashes);
    }

    /// Decide a `(searchee, candidate)` pair.
    pub async fn decide(
        &self,
        searchee: &Searchee,
        candidate: &Candidate,
    ) -> Result<MatchOutcome, StoreError> {
        let key = DecisionKey::new(&searchee.name, &candidate.indexer_id, &candidate.guid);

        if let Some(record) = self.store.has_decision(&key)? {
            if record.is_binding(&self.retention, Utc::now()) {
                debug!(
                    searchee = %searchee.name,
                    guid = %candidate.guid,
                    decision = record.decision.as_str(),
                    "Cached decision"
                );
                return Ok(MatchOutcome::cached(record.decision));
            }
        }

        // Step 1: size prefilter, skipped when partial matching relaxes the
        // expected candidate size.
        if !self.config.allow_partial
            && !size_within_fuzz(candidate.size, searchee.total_size, self.config.size_fuzz)
        {
            return self.reject(key, Decision::SizeMismatch).await;
        }

        // Step 2: fetch and parse metadata.
        let bytes = match self.fetcher.fetch(&candidate.indexer_id, &candidate.link).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let decision = download_failure_decision(&e);
                warn!(
                    searchee = %searchee.name,
                    guid = %candidate.guid,
                    error = %e,
                    decision = decision.as_str(),
                    "Candidate fetch failed"
                );
                return self.reject(key, decision).await;
            }
        };
        let metadata = match metainfo::parse(&bytes) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(guid = %candidate.guid, error = %e, "Candidate payload is not a torrent");
                return self.reject(key, Decision::DownloadFailed).await;
            }
        };

        // Steps 3 and 4: the pure core.
        let hash_known = self.known_hashes.read().await.contains(&metadata.info_hash);
        let mut decision = decide_from_metadata(searchee, &metadata, hash_known, &self.config);

        // Step 5: linking feasibility for matches that need data wired up.
        if matches!(decision, Decision::MatchPartial | Decision::MatchSizeOnly)
            && !self.link_policy.feasible_for(searchee)
        {
            debug!(
                searchee = %searchee.name,
                guid = %candidate.guid,
                "Match not linkable, downgrading"
            );
            decision = Decision::NoMatch;
        }

        let recorded_hash = (decision.is_accepted()
            || decision == Decision::InfoHashAlreadyExists)
            .then_some(metadata.info_hash);
        self.writer.record(key, decision, recorded_hash).await?;

        if decision.is_accepted() {
            Ok(MatchOutcome::accepted(decision, metadata, bytes))
        } else {
            Ok(MatchOutcome::rejected(decision))
        }
    }

    async fn reject(
        &self,
        key: DecisionKey,
        decision: Decision,
    ) -> Result<MatchOutcome, StoreError> {
        self.writer.record(key, decision, None).await?;
        Ok(MatchOutcome::rejected(decision))
    }
}

/// Map a fetch failure onto the decision taxonomy: rate limiting and
/// backed-off indexers are RATE_LIMITED (worth retrying once the indexer
/// recovers), everything else is DOWNLOAD_FAILED.
fn download_failure_decision(error: &TorznabError) -> Decision {
    match error {
        TorznabError::IndexerDisabled { .. } | TorznabError::IndexerAuthDisabled(_) => {
            Decision::RateLimited
        }
        TorznabError::HttpStatus { status: 429 } => Decision::RateLimited,
        _ => Decision::DownloadFailed,
    }
}
