//! End-to-end pipeline scenarios with mock gateways.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use reseeder_core::config::{ActionMode, MatchConfig};
use reseeder_core::decision::{Decision, DecisionKey, DecisionStore};
use reseeder_core::metainfo;
use reseeder_core::pipeline::PipelineError;
use reseeder_core::testing::fixtures;
use reseeder_core::torznab::{MetadataFetcher, TorznabError};

use common::{build, write_content, ContextOptions};

#[tokio::test]
async fn full_match_in_save_mode_writes_torrent_and_decision() {
    let ctx = build(ContextOptions::default());
    ctx.provider.add_indexer("alpha");

    let searchee = fixtures::build_searchee(
        "Show.S01.1080p-GRP",
        &[("E01.mkv", 1000), ("E02.mkv", 1000)],
    );
    ctx.pipeline.register_searchee(searchee).await.unwrap();

    let candidate = fixtures::candidate("alpha", "guid-1", "Show.S01.1080p-OTHER", 2000);
    let torrent = fixtures::build_torrent(
        "Show.S01.1080p-OTHER",
        &[("E01.mkv", 1000), ("E02.mkv", 1000)],
    );
    let info_hash = metainfo::parse(&torrent).unwrap().info_hash;
    ctx.fetcher.serve(&candidate.link, torrent);
    ctx.provider.set_results("alpha", vec![candidate]);

    let summary = ctx.pipeline.search_by_name("Show.S01.1080p-GRP").await.unwrap();
    assert_eq!(summary.decisions.get("MATCH"), Some(&1));
    assert_eq!(summary.dispatched, 1);

    // The .torrent landed in the output directory.
    let saved: Vec<_> = std::fs::read_dir(&ctx.output_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(saved.len(), 1);
    assert!(saved[0].ends_with(".torrent"));

    // The decision row is persisted with the info-hash.
    ctx.writer.flush().await.unwrap();
    let key = DecisionKey::new("Show.S01.1080p-GRP", "alpha", "guid-1");
    let record = ctx.store.has_decision(&key).unwrap().unwrap();
    assert_eq!(record.decision, Decision::Match);
    assert_eq!(record.info_hash, Some(info_hash));
}

#[tokio::test]
async fn size_mismatch_never_fetches_metadata() {
    let ctx = build(ContextOptions::default());
    ctx.provider.add_indexer("alpha");

    ctx.pipeline
        .register_searchee(fixtures::build_searchee(
            "Show.S01.1080p-GRP",
            &[("E01.mkv", 1000), ("E02.mkv", 1000)],
        ))
        .await
        .unwrap();

    // 25% off the searchee's 2000 bytes.
    let candidate = fixtures::candidate("alpha", "guid-1", "Show.S01.1080p-OTHER", 2500);
    ctx.provider.set_results("alpha", vec![candidate]);

    let summary = ctx.pipeline.search_by_name("Show.S01.1080p-GRP").await.unwrap();
    assert_eq!(summary.decisions.get("SIZE_MISMATCH"), Some(&1));
    assert_eq!(ctx.fetcher.request_count(), 0);
}

#[tokio::test]
async fn season_pack_episode_candidate_links_and_injects() {
    let ctx = build(ContextOptions {
        mode: ActionMode::Inject,
        matching: MatchConfig {
            allow_partial: true,
            ..Default::default()
        },
        ..Default::default()
    });
    ctx.provider.add_indexer("alpha");

    // Ten episodes on disk, flat layout.
    let episodes: Vec<(String, u64)> =
        (1..=10).map(|i| (format!("Show.S01E{i:02}.mkv"), 700u64)).collect();
    let episode_refs: Vec<(&str, u64)> =
        episodes.iter().map(|(p, s)| (p.as_str(), *s)).collect();
    let root = write_content(&ctx, "Show.S01.1080p-GRP", &episode_refs);

    let mut searchee = fixtures::build_searchee("Show.S01.1080p-GRP", &episode_refs);
    searchee = searchee.with_content_root(root.display().to_string());
    ctx.pipeline.register_searchee(searchee).await.unwrap();

    // Candidate is a single episode whose (basename, size) matches.
    let candidate = fixtures::candidate("alpha", "guid-ep", "Show.S01E04.1080p-OTHER", 700);
    let torrent = fixtures::build_torrent("Show.S01E04.1080p-OTHER", &[("Show.S01E04.mkv", 700)]);
    ctx.fetcher.serve(&candidate.link, torrent);
    ctx.provider.set_results("alpha", vec![candidate]);

    let summary = ctx.pipeline.search_by_name("Show.S01.1080p-GRP").await.unwrap();
    assert_eq!(summary.decisions.get("MATCH_PARTIAL"), Some(&1));
    assert_eq!(summary.dispatched, 1);

    // The single episode was linked into the client-visible layout and the
    // client received the injection pointed at the link dir.
    assert!(ctx
        .link_dir
        .join("Show.S01E04.1080p-OTHER/Show.S01E04.mkv")
        .exists());
    let added = ctx.client.added();
    assert_eq!(added.len(), 1);
    assert_eq!(added[0].data_path.as_deref(), Some(ctx.link_dir.as_path()));
}

#[tokio::test]
async fn candidate_matching_searchee_info_hash_is_deduped() {
    let ctx = build(ContextOptions::default());
    ctx.provider.add_indexer("alpha");

    // The searchee originated from this exact torrent.
    let torrent = fixtures::build_torrent("Show.S01.1080p-GRP", &[("E01.mkv", 1000)]);
    let searchee = reseeder_core::searchee::from_torrent_bytes(&torrent).unwrap();
    ctx.pipeline.register_searchee(searchee).await.unwrap();

    let candidate = fixtures::candidate("alpha", "guid-1", "Show.S01.1080p-GRP", 1000);
    ctx.fetcher.serve(&candidate.link, torrent);
    ctx.provider.set_results("alpha", vec![candidate]);

    let summary = ctx.pipeline.search_by_name("Show.S01.1080p-GRP").await.unwrap();
    assert_eq!(summary.decisions.get("INFO_HASH_ALREADY_EXISTS"), Some(&1));
    assert_eq!(summary.dispatched, 0);
}

#[tokio::test]
async fn duplicate_info_hash_within_cycle_dispatches_once() {
    let ctx = build(ContextOptions::default());
    ctx.provider.add_indexer("alpha");

    ctx.pipeline
        .register_searchee(fixtures::build_searchee(
            "Show.S01.1080p-GRP",
            &[("E01.mkv", 1000)],
        ))
        .await
        .unwrap();

    // Two guids on the same indexer advertising the identical torrent.
    let torrent = fixtures::build_torrent("Show.S01.1080p-RLS", &[("E01.mkv", 1000)]);
    let first = fixtures::candidate("alpha", "guid-1", "Show.S01.1080p-RLS", 1000);
    let second = fixtures::candidate("alpha", "guid-2", "Show.S01.1080p-RLS", 1000);
    ctx.fetcher.serve(&first.link, torrent.clone());
    ctx.fetcher.serve(&second.link, torrent);
    ctx.provider.set_results("alpha", vec![first, second]);

    let summary = ctx.pipeline.search_by_name("Show.S01.1080p-GRP").await.unwrap();
    // Both adjudicated MATCH, but only the first writer dispatched.
    assert_eq!(summary.decisions.get("MATCH"), Some(&2));
    assert_eq!(summary.dispatched, 1);

    let saved = std::fs::read_dir(&ctx.output_dir).unwrap().count();
    assert_eq!(saved, 1);
}

/// Fetcher that requests a pipeline shutdown while serving the nth fetch.
struct CancellingFetcher {
    inner: reseeder_core::testing::MockFetcher,
    pipeline: std::sync::Mutex<Option<Arc<reseeder_core::pipeline::SearchPipeline>>>,
    cancel_at: usize,
    count: AtomicUsize,
}

#[async_trait]
impl MetadataFetcher for CancellingFetcher {
    async fn fetch(&self, indexer_id: &str, link: &str) -> Result<Vec<u8>, TorznabError> {
        let n = self.count.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.cancel_at {
            if let Some(pipeline) = self.pipeline.lock().unwrap().as_ref() {
                pipeline.shutdown();
            }
        }
        self.inner.fetch(indexer_id, link).await
    }
}

#[tokio::test]
async fn shutdown_mid_cycle_stops_cleanly() {
    use reseeder_core::action::ActionDispatcher;
    use reseeder_core::config::{
        ActionConfig, MatchConfig, RetentionConfig, RetryConfig, SearchConfig,
    };
    use reseeder_core::decision::{DecisionWriter, SqliteDecisionStore};
    use reseeder_core::matcher::{LinkPolicy, MatchEngine};
    use reseeder_core::pipeline::SearchPipeline;
    use reseeder_core::testing::{MockFetcher, MockSearchProvider};

    let tmp = tempfile::TempDir::new().unwrap();
    let store = Arc::new(SqliteDecisionStore::in_memory().unwrap());
    let store_dyn: Arc<dyn DecisionStore> = Arc::clone(&store) as _;
    let (writer, _) = DecisionWriter::spawn(Arc::clone(&store_dyn));

    let mock = MockFetcher::default();
    let cancelling = Arc::new(CancellingFetcher {
        inner: mock.clone(),
        pipeline: std::sync::Mutex::new(None),
        cancel_at: 2,
        count: AtomicUsize::new(0),
    });

    let engine = Arc::new(MatchEngine::new(
        MatchConfig::default(),
        RetentionConfig::default(),
        Arc::clone(&store_dyn),
        writer.clone(),
        Arc::clone(&cancelling) as _,
        LinkPolicy::save_mode(),
    ));
    let dispatcher = Arc::new(ActionDispatcher::new(
        ActionConfig {
            mode: ActionMode::Save,
            output_dir: tmp.path().join("output"),
            link_dir: None,
            link_fallback_copy: false,
            category: None,
            tags: vec![],
            retry: RetryConfig::default(),
        },
        None,
        writer.clone(),
    ));
    let provider = MockSearchProvider::default();
    provider.add_indexer("alpha");
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
    *cancelling.pipeline.lock().unwrap() = Some(Arc::clone(&pipeline));

    pipeline
        .register_searchee(fixtures::build_searchee(
            "Show.S01.1080p-GRP",
            &[("E01.mkv", 1000)],
        ))
        .await
        .unwrap();

    // Five candidates; the shutdown fires while candidate 2 is fetching.
    let mut candidates = Vec::new();
    for i in 1..=5 {
        let candidate =
            fixtures::candidate("alpha", &format!("guid-{i}"), "Show.S01.1080p-RLS", 1000);
        mock.serve(
            &candidate.link,
            fixtures::build_torrent("Show.S01.1080p-RLS", &[("E01.mkv", 1000)]),
        );
        candidates.push(candidate);
    }
    provider.set_results("alpha", candidates);

    let result = pipeline.search_by_name("Show.S01.1080p-GRP").await;
    assert!(matches!(result, Err(PipelineError::Shutdown)));

    // Candidates 3-5 were never fetched.
    assert_eq!(mock.request_count(), 2);

    // Candidate 2's decision is either absent or fully written; 3-5 have
    // no rows at all, and the searchee was not marked searched.
    writer.flush().await.unwrap();
    for i in 3..=5 {
        let key = DecisionKey::new("Show.S01.1080p-GRP", "alpha", format!("guid-{i}"));
        assert!(store.has_decision(&key).unwrap().is_none());
    }
    let ts = store.searchee_timestamp("Show.S01.1080p-GRP").unwrap().unwrap();
    assert!(ts.last_searched.is_none());
}
