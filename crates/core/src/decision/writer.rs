//! Serialized decision-cache writer.
//!
//! All cache writes flow through one bounded queue drained by a single
//! task, so writers never contend on the store and enqueueing is the final
//! step of a decision: a cancelled computation that never enqueued leaves
//! no partial row behind.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

use crate::metainfo::InfoHash;

use super::types::{Decision, DecisionKey, DecisionStore, StoreError};

const WRITE_QUEUE_DEPTH: usize = 256;

enum WriteCommand {
    Decision {
        key: DecisionKey,
        decision: Decision,
        info_hash: Option<InfoHash>,
    },
    Searched {
        searchee_name: String,
        at: DateTime<Utc>,
    },
    Flush(tokio::sync::oneshot::Sender<()>),
}

/// Handle for enqueueing cache writes. Cheap to clone.
#[derive(Clone)]
pub struct DecisionWriter {
    tx: mpsc::Sender<WriteCommand>,
}

impl DecisionWriter {
    /// Spawn the writer task. The task drains until every handle is
    /// dropped, then flushes and exits.
    pub fn spawn(store: Arc<dyn DecisionStore>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let handle = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let result = match command {
                    WriteCommand::Decision {
                        key,
                        decision,
                        info_hash,
                    } => store.record_decision(&key, decision, info_hash),
                    WriteCommand::Searched { searchee_name, at } => {
                        store.mark_searched(&searchee_name, at)
                    }
                    WriteCommand::Flush(ack) => {
                        let _ = ack.send(());
                        Ok(())
                    }
                };
                if let Err(e) = result {
                    error!(error = %e, "Decision cache write failed");
                }
            }
        });
        (Self { tx }, handle)
    }

    /// Enqueue a decision row. Blocks when the queue is full; an error
    /// means the writer task is gone.
    pub async fn record(
        &self,
        key: DecisionKey,
        decision: Decision,
        info_hash: Option<InfoHash>,
    ) -> Result<(), StoreError> {
        self.tx
            .send(WriteCommand::Decision {
                key,
                decision,
                info_hash,
            })
            .await
            .map_err(|_| StoreError::Database("decision writer stopped".to_string()))
    }

    /// Enqueue a searched-at timestamp update.
    pub async fn mark_searched(
        &self,
        searchee_name: String,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.tx
            .send(WriteCommand::Searched { searchee_name, at })
            .await
            .map_err(|_| StoreError::Database("decision writer stopped".to_string()))
    }

    /// Wait until every write enqueued before this call has been applied.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let (ack_tx, ack_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(WriteCommand::Flush(ack_tx))
            .await
            .map_err(|_| StoreError::Database("decision writer stopped".to_string()))?;
        ack_rx
            .await
            .map_err(|_| StoreError::Database("decision writer stopped".to_string()))
    }
}
