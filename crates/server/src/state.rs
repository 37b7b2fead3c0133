//! Application state assembly.
//!
//! Wires the configuration into the component graph: store, gateways,
//! engine, dispatcher, pipeline, and announce channel.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use reseeder_core::action::ActionDispatcher;
use reseeder_core::announce::{self, AnnounceEvent, AnnounceListener};
use reseeder_core::arr::ArrGateway;
use reseeder_core::client::{QBittorrentClient, TorrentClient};
use reseeder_core::config::{ActionMode, ClientBackend, Config};
use reseeder_core::decision::{DecisionStore, DecisionWriter, IndexerRow, SqliteDecisionStore};
use reseeder_core::matcher::{LinkPolicy, MatchEngine};
use reseeder_core::pipeline::SearchPipeline;
use reseeder_core::searchee;
use reseeder_core::torznab::TorznabGateway;

const ANNOUNCE_QUEUE_DEPTH: usize = 64;

/// Startup failures, separated so the process can exit 1 for configuration
/// problems and 2 for runtime ones.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Shared daemon state.
pub struct AppState {
    pub config: Config,
    pub pipeline: Arc<SearchPipeline>,
    pub store: Arc<dyn DecisionStore>,
    pub gateway: Arc<TorznabGateway>,
    pub announce_tx: mpsc::Sender<AnnounceEvent>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Build the component graph. Returns the state and the announce
    /// listener, which the caller spawns.
    pub async fn build(config: Config) -> Result<(Arc<Self>, AnnounceListener), StartupError> {
        let store: Arc<dyn DecisionStore> = Arc::new(
            SqliteDecisionStore::open(&config.database.path)
                .map_err(|e| StartupError::Config(format!("cannot open database: {e}")))?,
        );
        let (writer, _writer_handle) = DecisionWriter::spawn(Arc::clone(&store));

        let timeout = config.search.operation_timeout();
        let gateway = Arc::new(TorznabGateway::new(&config.indexers, timeout));
        restore_indexer_state(&config, &store, &gateway).await;

        let arr = if config.sonarr.is_empty() && config.radarr.is_empty() {
            None
        } else {
            let arr = Arc::new(ArrGateway::new(
                config.sonarr.clone(),
                config.radarr.clone(),
                timeout,
            ));
            // Unreachable arrs are a configuration problem, caught now
            // rather than mid-cycle.
            arr.probe_all()
                .await
                .map_err(|e| StartupError::Config(format!("arr probe failed: {e}")))?;
            Some(arr)
        };

        let client = build_client(&config)?;

        let link_policy = match config.action.mode {
            ActionMode::Save => LinkPolicy::save_mode(),
            ActionMode::Inject => LinkPolicy {
                inject: true,
                link_dir: config.action.link_dir.clone(),
                fallback_copy: config.action.link_fallback_copy,
            },
        };
        let engine = Arc::new(MatchEngine::new(
            config.matching.clone(),
            config.retention.clone(),
            Arc::clone(&store),
            writer.clone(),
            Arc::clone(&gateway) as _,
            link_policy,
        ));

        let dispatcher = Arc::new(ActionDispatcher::new(
            config.action.clone(),
            client.clone(),
            writer.clone(),
        ));

        let pipeline = Arc::new(SearchPipeline::new(
            config.search.clone(),
            Arc::clone(&store),
            Arc::clone(&gateway) as _,
            Arc::clone(&engine),
            dispatcher,
            arr,
            writer.clone(),
        ));

        enumerate_searchees(&config, &pipeline, client.as_ref(), &engine).await?;

        let (announce_tx, listener) =
            announce::channel(Arc::clone(&pipeline), ANNOUNCE_QUEUE_DEPTH);

        let state = Arc::new(Self {
            config,
            pipeline,
            store,
            gateway,
            announce_tx,
            started_at: Utc::now(),
        });
        Ok((state, listener))
    }
}

fn build_client(
    config: &Config,
) -> Result<Option<Arc<Mutex<Box<dyn TorrentClient>>>>, StartupError> {
    let Some(client_config) = &config.client else {
        return Ok(None);
    };
    let client: Box<dyn TorrentClient> = match client_config.backend {
        ClientBackend::QBittorrent => {
            let qbit = client_config.qbittorrent.clone().ok_or_else(|| {
                StartupError::Config("qbittorrent backend requires [client.qbittorrent]".into())
            })?;
            Box::new(QBittorrentClient::new(qbit))
        }
    };
    info!(backend = client.name(), "Torrent client configured");
    Ok(Some(Arc::new(Mutex::new(client))))
}

/// Persist configured indexers and restore cached capability documents.
async fn restore_indexer_state(
    config: &Config,
    store: &Arc<dyn DecisionStore>,
    gateway: &Arc<TorznabGateway>,
) {
    for indexer in &config.indexers {
        match store.get_indexer(&indexer.id) {
            Ok(Some(row)) => {
                if let Some(caps_json) = &row.caps_json {
                    match serde_json::from_str(caps_json) {
                        Ok(caps) => gateway.prime_caps(&indexer.id, caps).await,
                        Err(e) => {
                            warn!(indexer = %indexer.id, error = %e, "Ignoring cached caps")
                        }
                    }
                }
            }
            Ok(None) => {
                let row = IndexerRow {
                    id: indexer.id.clone(),
                    url: indexer.url.clone(),
                    active: indexer.active,
                    disabled_until: None,
                    caps_json: None,
                };
                if let Err(e) = store.upsert_indexer(&row) {
                    warn!(indexer = %indexer.id, error = %e, "Failed to persist indexer row");
                }
            }
            Err(e) => warn!(indexer = %indexer.id, error = %e, "Failed to load indexer row"),
        }
    }
}

/// Enumerate searchees from every configured source.
async fn enumerate_searchees(
    config: &Config,
    pipeline: &Arc<SearchPipeline>,
    client: Option<&Arc<Mutex<Box<dyn TorrentClient>>>>,
    engine: &Arc<MatchEngine>,
) -> Result<(), StartupError> {
    let mut registered = 0usize;

    for dir in &config.sources.torrent_dirs {
        for entry in read_dir(dir)? {
            if entry.extension().map(|e| e == "torrent").unwrap_or(false) {
                match searchee::from_torrent_path(&entry) {
                    Ok(searchee) => {
                        register(pipeline, searchee).await?;
                        registered += 1;
                    }
                    Err(e) => warn!(path = %entry.display(), error = %e, "Skipping torrent file"),
                }
            }
        }
    }

    for dir in &config.sources.data_dirs {
        for entry in read_dir(dir)? {
            if entry.is_dir() {
                match searchee::from_data_dir(&entry) {
                    Ok(searchee) => {
                        register(pipeline, searchee).await?;
                        registered += 1;
                    }
                    Err(e) => warn!(path = %entry.display(), error = %e, "Skipping data dir"),
                }
            }
        }
    }

    if config.sources.use_client {
        if let Some(client) = client {
            let torrents = client
                .lock()
                .await
                .get_torrents()
                .await
                .map_err(|e| StartupError::Runtime(format!("client enumeration failed: {e}")))?;
            engine
                .register_known_hashes(torrents.iter().map(|t| t.info_hash))
                .await;
            for torrent in &torrents {
                // Partially downloaded torrents are not usable references.
                if torrent.progress < 1.0 {
                    continue;
                }
                register(pipeline, searchee::from_client_torrent(torrent)).await?;
                registered += 1;
            }
        } else {
            warn!("sources.use_client set but no client configured");
        }
    }

    info!(searchees = registered, "Searchee enumeration complete");
    Ok(())
}

async fn register(
    pipeline: &Arc<SearchPipeline>,
    searchee: reseeder_core::Searchee,
) -> Result<(), StartupError> {
    pipeline
        .register_searchee(searchee)
        .await
        .map_err(|e| StartupError::Runtime(format!("failed to register searchee: {e}")))
}

fn read_dir(dir: &Path) -> Result<Vec<std::path::PathBuf>, StartupError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| StartupError::Config(format!("cannot read {}: {e}", dir.display())))?;
    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .collect();
    paths.sort();
    Ok(paths)
}
