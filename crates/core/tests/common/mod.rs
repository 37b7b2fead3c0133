//! Shared harness for pipeline integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::Mutex;

use reseeder_core::action::ActionDispatcher;
use reseeder_core::client::TorrentClient;
use reseeder_core::config::{
    ActionConfig, ActionMode, MatchConfig, RetentionConfig, RetryConfig, SearchConfig,
};
use reseeder_core::decision::{DecisionStore, DecisionWriter, SqliteDecisionStore};
use reseeder_core::matcher::{LinkPolicy, MatchEngine};
use reseeder_core::pipeline::SearchPipeline;
use reseeder_core::testing::{MockFetcher, MockSearchProvider, MockTorrentClient};

pub struct ContextOptions {
    pub mode: ActionMode,
    pub matching: MatchConfig,
    pub retention: RetentionConfig,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            mode: ActionMode::Save,
            matching: MatchConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

pub struct TestContext {
    pub pipeline: Arc<SearchPipeline>,
    pub provider: MockSearchProvider,
    pub fetcher: MockFetcher,
    pub client: MockTorrentClient,
    pub store: Arc<SqliteDecisionStore>,
    pub writer: DecisionWriter,
    pub output_dir: PathBuf,
    pub link_dir: PathBuf,
    pub content_dir: PathBuf,
    pub tmp: TempDir,
}

pub fn build(options: ContextOptions) -> TestContext {
    let tmp = TempDir::new().unwrap();
    let output_dir = tmp.path().join("output");
    let link_dir = tmp.path().join("links");
    let content_dir = tmp.path().join("content");
    std::fs::create_dir_all(&content_dir).unwrap();

    let store = Arc::new(SqliteDecisionStore::in_memory().unwrap());
    let store_dyn: Arc<dyn DecisionStore> = Arc::clone(&store) as _;
    let (writer, _) = DecisionWriter::spawn(Arc::clone(&store_dyn));

    let provider = MockSearchProvider::default();
    let fetcher = MockFetcher::default();
    let client = MockTorrentClient::default();

    let link_policy = match options.mode {
        ActionMode::Save => LinkPolicy::save_mode(),
        ActionMode::Inject => LinkPolicy {
            inject: true,
            link_dir: Some(link_dir.clone()),
            fallback_copy: false,
        },
    };
    let engine = Arc::new(MatchEngine::new(
        options.matching,
        options.retention,
        Arc::clone(&store_dyn),
        writer.clone(),
        Arc::new(fetcher.clone()),
        link_policy,
    ));

    let action_config = ActionConfig {
        mode: options.mode,
        output_dir: output_dir.clone(),
        link_dir: Some(link_dir.clone()),
        link_fallback_copy: false,
        category: Some("cross-seed".to_string()),
        tags: vec![],
        retry: RetryConfig {
            max_attempts: 2,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        },
    };
    let boxed: Box<dyn TorrentClient> = Box::new(client.clone());
    let dispatcher = Arc::new(ActionDispatcher::new(
        action_config,
        Some(Arc::new(Mutex::new(boxed))),
        writer.clone(),
    ));

    let pipeline = Arc::new(SearchPipeline::new(
        SearchConfig {
            cadence_secs: 3600,
            poll_interval_secs: 1,
            ..Default::default()
        },
        store_dyn,
        Arc::new(provider.clone()),
        engine,
        dispatcher,
        None,
        writer.clone(),
    ));

    TestContext {
        pipeline,
        provider,
        fetcher,
        client,
        store,
        writer,
        output_dir,
        link_dir,
        content_dir,
        tmp,
    }
}

/// Write content files under a named directory inside the context's
/// content dir, returning the content root.
pub fn write_content(context: &TestContext, name: &str, files: &[(&str, u64)]) -> PathBuf {
    let root = context.content_dir.join(name);
    for (rel, size) in files {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, vec![0u8; *size as usize]).unwrap();
    }
    root
}
