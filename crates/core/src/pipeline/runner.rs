//! Pipeline runner: cycles, scheduling, and candidate handling.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock, Semaphore};
use tracing::{debug, info, warn};

use crate::action::{AcceptedMatch, ActionDispatcher, ActionError, InjectionPhase};
use crate::arr::{ArrGateway, ExternalIds};
use crate::config::SearchConfig;
use crate::decision::{
    Decision, DecisionKey, DecisionStore, DecisionWriter, IndexerRow, StoreError,
};
use crate::matcher::{MatchEngine, MatchOutcome};
use crate::metainfo::InfoHash;
use crate::release;
use crate::searchee::Searchee;
use crate::torznab::{Candidate, SearchProvider, TorznabError};

use super::query::build_query;
use super::singleflight::SingleFlight;

/// Errors that abort a cycle. Everything transient is handled inside the
/// cycle; these are the ones the caller sees.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch error: {0}")]
    Action(#[from] ActionError),

    #[error("Cycle deadline exceeded")]
    CycleTimeout,

    #[error("Shutdown requested")]
    Shutdown,

    #[error("Unknown searchee: {0}")]
    UnknownSearchee(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

/// Counters from one search cycle.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CycleSummary {
    pub searchee: String,
    pub indexers_searched: usize,
    pub indexer_errors: usize,
    pub candidates: usize,
    /// Decisions by stable tag.
    pub decisions: BTreeMap<&'static str, usize>,
    /// Accepted matches actually handed to the dispatcher.
    pub dispatched: usize,
}

impl CycleSummary {
    fn new(searchee: &str) -> Self {
        Self {
            searchee: searchee.to_string(),
            ..Default::default()
        }
    }

    fn note(&mut self, decision: Decision) {
        self.candidates += 1;
        *self.decisions.entry(decision.as_str()).or_insert(0) += 1;
    }
}

/// Pipeline state for status APIs.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineStatus {
    pub running: bool,
    pub searchees: usize,
    pub inflight_decisions: usize,
}

/// The search pipeline.
pub struct SearchPipeline {
    search_config: SearchConfig,
    store: Arc<dyn DecisionStore>,
    provider: Arc<dyn SearchProvider>,
    engine: Arc<MatchEngine>,
    dispatcher: Arc<ActionDispatcher>,
    arr: Option<Arc<ArrGateway>>,
    writer: DecisionWriter,
    searchees: RwLock<HashMap<String, Arc<Searchee>>>,
    /// Global cap on concurrent indexer/client HTTP work.
    semaphore: Arc<Semaphore>,
    inflight: SingleFlight,
    shutdown_tx: broadcast::Sender<()>,
    running: AtomicBool,
}

impl SearchPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        search_config: SearchConfig,
        store: Arc<dyn DecisionStore>,
        provider: Arc<dyn SearchProvider>,
        engine: Arc<MatchEngine>,
        dispatcher: Arc<ActionDispatcher>,
        arr: Option<Arc<ArrGateway>>,
        writer: DecisionWriter,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let semaphore = Arc::new(Semaphore::new(search_config.concurrency));
        Self {
            search_config,
            store,
            provider,
            engine,
            dispatcher,
            arr,
            writer,
            searchees: RwLock::new(HashMap::new()),
            semaphore,
            inflight: SingleFlight::new(),
            shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Add a searchee to the in-memory index and the scheduler's table.
    pub async fn register_searchee(&self, searchee: Searchee) -> Result<(), StoreError> {
        self.store.ensure_searchee(&searchee.name)?;
        if let Some(hash) = searchee.info_hash {
            self.engine.register_known_hashes([hash]).await;
        }
        debug!(searchee = %searchee.name, origin = searchee.origin.as_str(), "Registered searchee");
        self.searchees
            .write()
            .await
            .insert(searchee.name.clone(), Arc::new(searchee));
        Ok(())
    }

    pub async fn searchee(&self, name: &str) -> Option<Arc<Searchee>> {
        self.searchees.read().await.get(name).cloned()
    }

    pub async fn known_searchees(&self) -> Vec<Arc<Searchee>> {
        self.searchees.read().await.values().cloned().collect()
    }

    pub async fn status(&self) -> PipelineStatus {
        PipelineStatus {
            running: self.running.load(Ordering::Relaxed),
            searchees: self.searchees.read().await.len(),
            inflight_decisions: self.inflight.len().await,
        }
    }

    /// Start the background scheduler loop.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Pipeline scheduler already running");
            return;
        }
        info!("Search scheduler started");

        let pipeline = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let poll = std::time::Duration::from_secs(pipeline.search_config.poll_interval_secs);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(poll) => {
                        if !pipeline.running.load(Ordering::Relaxed) {
                            break;
                        }
                        match pipeline.run_next_due(Utc::now()).await {
                            Ok(Some(summary)) => {
                                info!(
                                    searchee = %summary.searchee,
                                    candidates = summary.candidates,
                                    dispatched = summary.dispatched,
                                    "Search cycle complete"
                                );
                            }
                            Ok(None) => {}
                            Err(PipelineError::Shutdown) => break,
                            Err(e) => warn!(error = %e, "Search cycle failed"),
                        }
                    }
                }
            }
            info!("Search scheduler stopped");
        });
    }

    /// Stop the scheduler and cancel in-flight cycles.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
    }

    /// A receiver that fires when `shutdown` is called, for sibling tasks
    /// (announce listener, servers) that stop with the pipeline.
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Run a cycle for the searchee most overdue for a search, if any.
    pub async fn run_next_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<CycleSummary>, PipelineError> {
        let Some(name) = self
            .store
            .next_due_searchee(now, self.search_config.cadence_secs)?
        else {
            return Ok(None);
        };

        let Some(searchee) = self.searchee(&name).await else {
            // Known to the store but no longer enumerated; push its
            // timestamp forward so the scheduler moves on.
            debug!(searchee = %name, "Due searchee not in memory, deferring");
            self.writer.mark_searched(name, now).await?;
            return Ok(None);
        };

        self.store
            .set_job_status("search", "scheduler", "running", Some(&name))?;
        let result = self.run_cycle(searchee).await;
        self.store.set_job_status("search", "scheduler", "idle", None)?;
        result.map(Some)
    }

    /// On-demand cycle for a named searchee.
    pub async fn search_by_name(&self, name: &str) -> Result<CycleSummary, PipelineError> {
        let searchee = self
            .searchee(name)
            .await
            .ok_or_else(|| PipelineError::UnknownSearchee(name.to_string()))?;
        self.run_cycle(searchee).await
    }

    /// One full search cycle under the cycle deadline.
    pub async fn run_cycle(&self, searchee: Arc<Searchee>) -> Result<CycleSummary, PipelineError> {
        tokio::time::timeout(self.search_config.cycle_timeout(), self.cycle_inner(searchee))
            .await
            .map_err(|_| PipelineError::CycleTimeout)?
    }

    async fn cycle_inner(&self, searchee: Arc<Searchee>) -> Result<CycleSummary, PipelineError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let parsed = release::parse(&searchee.name);
        debug!(
            searchee = %searchee.name,
            title = %parsed.title,
            media_type = parsed.media_type.as_str(),
            "Cycle start"
        );

        let ids = match &self.arr {
            Some(arr) if arr.is_configured() => {
                arr.resolve_ids(&parsed.title, parsed.media_type).await
            }
            _ => ExternalIds::default(),
        };

        // Pick indexers whose capabilities fit and build each one's query.
        let mut targets = Vec::new();
        for indexer in self.provider.indexer_ids().await {
            let caps = match self.provider.probe(&indexer).await {
                Ok(caps) => caps,
                Err(e) => {
                    warn!(indexer = %indexer, error = %e, "Capability probe failed, skipping");
                    continue;
                }
            };
            if let Some(query) = build_query(&parsed, &ids, &caps) {
                targets.push((indexer, query));
            }
        }

        // Fan out under the global concurrency cap.
        let operation_timeout = self.search_config.operation_timeout();
        let searches = targets.into_iter().map(|(indexer, query)| {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&self.semaphore);
            async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let result =
                    match tokio::time::timeout(operation_timeout, provider.search(&indexer, &query))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(TorznabError::Timeout),
                    };
                (indexer, result)
            }
        });
        let results = futures::future::join_all(searches).await;

        // Stream candidates through the matcher in declared order.
        let mut summary = CycleSummary::new(&searchee.name);
        let mut seen_hashes = HashSet::new();
        for (indexer, result) in results {
            let candidates = match result {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(indexer = %indexer, error = %e, "Indexer search failed");
                    summary.indexer_errors += 1;
                    continue;
                }
            };
            summary.indexers_searched += 1;

            for candidate in candidates {
                if shutdown_rx.try_recv().is_ok() {
                    return Err(PipelineError::Shutdown);
                }
                self.handle_candidate(&searchee, &candidate, &mut seen_hashes, &mut summary)
                    .await?;
            }
        }

        // Mark searched only on completion; a cancelled cycle stays due.
        self.writer
            .mark_searched(searchee.name.clone(), Utc::now())
            .await?;
        self.persist_indexer_state().await;
        Ok(summary)
    }

    /// Mirror gateway state (backoff deadlines, discovered capabilities and
    /// categories) into the store for observability across restarts.
    async fn persist_indexer_state(&self) {
        for snapshot in self.provider.snapshots().await {
            let caps_json = snapshot
                .caps
                .as_ref()
                .and_then(|caps| serde_json::to_string(caps).ok());
            let row = IndexerRow {
                id: snapshot.id.clone(),
                url: snapshot.url.clone(),
                active: snapshot.active,
                disabled_until: snapshot.disabled_until,
                caps_json,
            };
            if let Err(e) = self.store.upsert_indexer(&row) {
                warn!(indexer = %snapshot.id, error = %e, "Failed to persist indexer state");
                continue;
            }
            if let Some(caps) = &snapshot.caps {
                if let Err(e) = self
                    .store
                    .replace_indexer_categories(&snapshot.id, &caps.categories)
                {
                    warn!(indexer = %snapshot.id, error = %e, "Failed to persist indexer categories");
                }
            }
        }
    }

    /// Feed one real-time candidate to every searchee whose cleaned title
    /// token-matches its name. Returns the decision per matched searchee.
    pub async fn process_announce(
        &self,
        candidate: Candidate,
    ) -> Result<Vec<(String, Decision)>, PipelineError> {
        let candidate_tokens: HashSet<String> =
            release::title_tokens(&candidate.name).into_iter().collect();

        let mut results = Vec::new();
        let mut seen_hashes = HashSet::new();
        for searchee in self.known_searchees().await {
            let title = release::parse(&searchee.name).title;
            let tokens = release::title_tokens(&title);
            if tokens.is_empty() || !tokens.iter().all(|t| candidate_tokens.contains(t)) {
                continue;
            }
            let mut summary = CycleSummary::new(&searchee.name);
            let decision = self
                .handle_candidate(&searchee, &candidate, &mut seen_hashes, &mut summary)
                .await?;
            results.push((searchee.name.clone(), decision));
        }
        Ok(results)
    }

    async fn handle_candidate(
        &self,
        searchee: &Arc<Searchee>,
        candidate: &Candidate,
        seen_hashes: &mut HashSet<InfoHash>,
        summary: &mut CycleSummary,
    ) -> Result<Decision, PipelineError> {
        let outcome = self.adjudicate(searchee, candidate).await?;
        summary.note(outcome.decision);

        if !outcome.decision.is_accepted() || outcome.from_cache {
            return Ok(outcome.decision);
        }

        let MatchOutcome {
            decision,
            metadata: Some(metadata),
            torrent_bytes: Some(torrent_bytes),
            ..
        } = outcome
        else {
            return Err(PipelineError::Invariant(format!(
                "accepted decision for {} lacks metadata",
                candidate.guid
            )));
        };

        // First writer wins per cycle: one injection per info-hash.
        if !seen_hashes.insert(metadata.info_hash) {
            debug!(
                info_hash = %metadata.info_hash,
                guid = %candidate.guid,
                "Duplicate info-hash in cycle, skipping dispatch"
            );
            return Ok(decision);
        }

        let accepted = AcceptedMatch {
            searchee: Arc::clone(searchee),
            candidate: candidate.clone(),
            decision,
            metadata,
            torrent_bytes,
        };
        let dispatch = self.dispatcher.dispatch(&accepted).await?;
        if dispatch.phase == InjectionPhase::Success {
            summary.dispatched += 1;
        }
        Ok(decision)
    }

    /// Single-flight adjudication under the global concurrency cap.
    async fn adjudicate(
        &self,
        searchee: &Arc<Searchee>,
        candidate: &Candidate,
    ) -> Result<MatchOutcome, StoreError> {
        let key = DecisionKey::new(&searchee.name, &candidate.indexer_id, &candidate.guid);
        let engine = Arc::clone(&self.engine);
        let semaphore = Arc::clone(&self.semaphore);
        let searchee = Arc::clone(searchee);
        let candidate = candidate.clone();

        self.inflight
            .run(key, move || {
                let engine = Arc::clone(&engine);
                let semaphore = Arc::clone(&semaphore);
                let searchee = Arc::clone(&searchee);
                let candidate = candidate.clone();
                async move {
                    let _permit =
                        semaphore.acquire_owned().await.expect("semaphore never closed");
                    engine.decide(&searchee, &candidate).await
                }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionDispatcher;
    use crate::config::{ActionConfig, ActionMode, MatchConfig, RetentionConfig, RetryConfig};
    use crate::decision::SqliteDecisionStore;
    use crate::matcher::LinkPolicy;
    use crate::testing::fixtures;
    use crate::testing::{MockFetcher, MockSearchProvider};
    use tempfile::TempDir;

    struct Harness {
        pipeline: Arc<SearchPipeline>,
        provider: MockSearchProvider,
        fetcher: MockFetcher,
        store: Arc<SqliteDecisionStore>,
        writer: DecisionWriter,
        _output: TempDir,
    }

    fn harness() -> Harness {
        let output = TempDir::new().unwrap();
        let store = Arc::new(SqliteDecisionStore::in_memory().unwrap());
        let store_dyn: Arc<dyn DecisionStore> = Arc::clone(&store) as _;
        let (writer, _) = DecisionWriter::spawn(Arc::clone(&store_dyn));

        let provider = MockSearchProvider::default();
        let fetcher = MockFetcher::default();

        let engine = Arc::new(MatchEngine::new(
            MatchConfig::default(),
            RetentionConfig::default(),
            Arc::clone(&store_dyn),
            writer.clone(),
            Arc::new(fetcher.clone()),
            LinkPolicy::save_mode(),
        ));
        let dispatcher = Arc::new(ActionDispatcher::new(
            ActionConfig {
                mode: ActionMode::Save,
                output_dir: output.path().to_path_buf(),
                link_dir: None,
                link_fallback_copy: false,
                category: None,
                tags: vec![],
                retry: RetryConfig::default(),
            },
            None,
            writer.clone(),
        ));

        let pipeline = Arc::new(SearchPipeline::new(
            SearchConfig {
                cadence_secs: 3600,
                ..Default::default()
            },
            store_dyn,
            Arc::new(provider.clone()),
            engine,
            dispatcher,
            None,
            writer.clone(),
        ));

        Harness {
            pipeline,
            provider,
            fetcher,
            store,
            writer,
            _output: output,
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let h = harness();
        h.pipeline
            .register_searchee(fixtures::build_searchee("Show.S01.1080p-GRP", &[("E01.mkv", 10)]))
            .await
            .unwrap();

        assert!(h.pipeline.searchee("Show.S01.1080p-GRP").await.is_some());
        assert!(h.pipeline.searchee("unknown").await.is_none());
        assert_eq!(h.pipeline.known_searchees().await.len(), 1);
        // The scheduler sees it immediately.
        assert_eq!(
            h.store.next_due_searchee(Utc::now(), 3600).unwrap().as_deref(),
            Some("Show.S01.1080p-GRP")
        );
    }

    #[tokio::test]
    async fn test_run_next_due_with_empty_store() {
        let h = harness();
        assert!(h.pipeline.run_next_due(Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cycle_counts_indexer_errors() {
        let h = harness();
        h.provider.add_indexer("alpha");
        h.provider.fail_searches();

        h.pipeline
            .register_searchee(fixtures::build_searchee("Show.S01.1080p-GRP", &[("E01.mkv", 10)]))
            .await
            .unwrap();
        let summary = h.pipeline.search_by_name("Show.S01.1080p-GRP").await.unwrap();
        assert_eq!(summary.indexer_errors, 1);
        assert_eq!(summary.indexers_searched, 0);
        assert_eq!(summary.candidates, 0);
    }

    #[tokio::test]
    async fn test_search_by_unknown_name() {
        let h = harness();
        assert!(matches!(
            h.pipeline.search_by_name("nope").await,
            Err(PipelineError::UnknownSearchee(_))
        ));
    }

    #[tokio::test]
    async fn test_cycle_adjudicates_candidates() {
        let h = harness();
        h.provider.add_indexer("alpha");

        let searchee = fixtures::build_searchee(
            "Show.S01.1080p-GRP",
            &[("E01.mkv", 1000), ("E02.mkv", 1000)],
        );
        h.pipeline.register_searchee(searchee).await.unwrap();

        let cand = fixtures::candidate("alpha", "g1", "Show.S01.1080p-GRP", 2000);
        h.fetcher.serve(
            &cand.link,
            fixtures::build_torrent("Show.S01.1080p-GRP", &[("E01.mkv", 1000), ("E02.mkv", 1000)]),
        );
        h.provider.set_results("alpha", vec![cand]);

        let summary = h.pipeline.search_by_name("Show.S01.1080p-GRP").await.unwrap();
        assert_eq!(summary.candidates, 1);
        assert_eq!(summary.decisions.get("MATCH"), Some(&1));
        assert_eq!(summary.dispatched, 1);

        // Completion marks the searchee searched.
        h.writer.flush().await.unwrap();
        assert!(h
            .store
            .next_due_searchee(Utc::now(), 3600)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_announce_token_matching() {
        let h = harness();
        h.pipeline
            .register_searchee(fixtures::build_searchee(
                "Show.Name.S01.1080p-GRP",
                &[("E01.mkv", 1000)],
            ))
            .await
            .unwrap();
        h.pipeline
            .register_searchee(fixtures::build_searchee(
                "Other.Title.S02.720p-GRP",
                &[("x.mkv", 5)],
            ))
            .await
            .unwrap();

        let cand = fixtures::candidate("alpha", "g9", "Show.Name.S01E01.1080p.WEB-OTH", 1000);
        h.fetcher.serve(
            &cand.link,
            fixtures::build_torrent("Show.Name.S01E01.1080p.WEB-OTH", &[("E01.mkv", 1000)]),
        );

        let results = h.pipeline.process_announce(cand).await.unwrap();
        // Only the token-matching searchee was adjudicated.
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "Show.Name.S01.1080p-GRP");
        assert_eq!(results[0].1, Decision::Match);
    }

    #[tokio::test]
    async fn test_status_reports() {
        let h = harness();
        let status = h.pipeline.status().await;
        assert!(!status.running);
        assert_eq!(status.searchees, 0);
        assert_eq!(status.inflight_decisions, 0);
    }
}
