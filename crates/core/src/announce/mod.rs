//! Real-time announce ingestion.
//!
//! Announce events (IRC bridges, indexer webhooks) arrive one candidate at
//! a time and go through the same matcher and dispatcher path as scheduled
//! searches, bypassing the scheduler. The channel is bounded, so a flood
//! of announces backpressures the producer instead of the matcher.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::metainfo::InfoHash;
use crate::pipeline::SearchPipeline;
use crate::torznab::Candidate;

/// One announce event as delivered by a producer.
#[derive(Debug, Clone, Deserialize)]
pub struct AnnounceEvent {
    /// Indexer the announce came from.
    pub indexer_id: String,
    /// Indexer-local unique id; the announce URL when absent upstream.
    pub guid: String,
    pub name: String,
    pub link: String,
    pub size: u64,
    #[serde(default)]
    pub pub_date: Option<DateTime<Utc>>,
    /// Info-hash when the announce carries one.
    #[serde(default)]
    pub info_hash: Option<InfoHash>,
}

impl AnnounceEvent {
    pub fn into_candidate(self) -> Candidate {
        Candidate {
            indexer_id: self.indexer_id,
            guid: self.guid,
            name: self.name,
            size: self.size,
            link: self.link,
            pub_date: self.pub_date,
            info_hash_hint: self.info_hash,
        }
    }
}

/// Consumes announce events and feeds them into the pipeline.
pub struct AnnounceListener {
    pipeline: Arc<SearchPipeline>,
    rx: mpsc::Receiver<AnnounceEvent>,
}

/// Create a bounded announce channel and its listener.
pub fn channel(
    pipeline: Arc<SearchPipeline>,
    depth: usize,
) -> (mpsc::Sender<AnnounceEvent>, AnnounceListener) {
    let (tx, rx) = mpsc::channel(depth);
    (tx, AnnounceListener { pipeline, rx })
}

impl AnnounceListener {
    /// Drain events until shutdown or every sender is gone.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Announce listener started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                event = self.rx.recv() => {
                    let Some(event) = event else { break };
                    self.handle(event).await;
                }
            }
        }
        info!("Announce listener stopped");
    }

    async fn handle(&self, event: AnnounceEvent) {
        let name = event.name.clone();
        debug!(announce = %name, indexer = %event.indexer_id, "Announce received");
        match self.pipeline.process_announce(event.into_candidate()).await {
            Ok(results) if results.is_empty() => {
                debug!(announce = %name, "No searchee matched announce");
            }
            Ok(results) => {
                for (searchee, decision) in results {
                    info!(
                        announce = %name,
                        searchee = %searchee,
                        decision = decision.as_str(),
                        "Announce adjudicated"
                    );
                }
            }
            Err(e) => warn!(announce = %name, error = %e, "Announce processing failed"),
        }
    }
}
