//! Save/inject dispatch state machine.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::{InjectRequest, InjectStatus, TorrentClient};
use crate::config::{ActionConfig, ActionMode};
use crate::decision::{Decision, DecisionKey, DecisionWriter};
use crate::metainfo::FileEntry;

use super::linker::link_file;
use super::types::{AcceptedMatch, ActionError, DispatchOutcome, InjectionPhase};

/// Dispatches accepted matches according to the configured action mode.
///
/// The client adapter is assumed non-thread-safe and is driven behind a
/// mutex; injections therefore serialize per client.
pub struct ActionDispatcher {
    config: ActionConfig,
    client: Option<Arc<Mutex<Box<dyn TorrentClient>>>>,
    writer: DecisionWriter,
}

impl ActionDispatcher {
    pub fn new(
        config: ActionConfig,
        client: Option<Arc<Mutex<Box<dyn TorrentClient>>>>,
        writer: DecisionWriter,
    ) -> Self {
        Self {
            config,
            client,
            writer,
        }
    }

    /// Dispatch one accepted match, retrying client errors with exponential
    /// backoff up to the configured ceiling. The accepted decision row is
    /// retained across failures; only a reported conflict rewrites it.
    pub async fn dispatch(&self, matched: &AcceptedMatch) -> Result<DispatchOutcome, ActionError> {
        match self.config.mode {
            ActionMode::Save => self.save(matched).await,
            ActionMode::Inject => self.inject_with_retry(matched).await,
        }
    }

    async fn save(&self, matched: &AcceptedMatch) -> Result<DispatchOutcome, ActionError> {
        fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(|source| ActionError::Io {
                path: self.config.output_dir.clone(),
                source,
            })?;

        let base = sanitize_file_name(&matched.metadata.name);
        let mut path = self.config.output_dir.join(format!("{base}.torrent"));
        if fs::try_exists(&path).await.unwrap_or(false) {
            // Collision: suffix with a short hash.
            let hex = matched.metadata.info_hash.to_hex();
            path = self
                .config
                .output_dir
                .join(format!("{base}.{}.torrent", &hex[..8]));
        }

        fs::write(&path, &matched.torrent_bytes)
            .await
            .map_err(|source| ActionError::Io {
                path: path.clone(),
                source,
            })?;

        info!(
            searchee = %matched.searchee.name,
            torrent = %matched.metadata.name,
            path = %path.display(),
            "Saved cross-seed torrent"
        );
        Ok(DispatchOutcome {
            phase: InjectionPhase::Success,
            saved_path: Some(path),
            attempts: 0,
        })
    }

    async fn inject_with_retry(
        &self,
        matched: &AcceptedMatch,
    ) -> Result<DispatchOutcome, ActionError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.inject_once(matched).await {
                Ok(outcome) => {
                    return Ok(DispatchOutcome {
                        attempts: attempt,
                        ..outcome
                    })
                }
                Err(ActionError::Client(e)) => {
                    match self.config.retry.delay_for_attempt(attempt) {
                        Some(delay) => {
                            warn!(
                                searchee = %matched.searchee.name,
                                error = %e,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "Injection failed, backing off"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            warn!(
                                searchee = %matched.searchee.name,
                                error = %e,
                                attempts = attempt,
                                "Injection failed past retry ceiling"
                            );
                            return Ok(DispatchOutcome {
                                phase: InjectionPhase::ClientError,
                                saved_path: None,
                                attempts: attempt,
                            });
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One pass through PENDING → LINKING → INJECTING.
    async fn inject_once(&self, matched: &AcceptedMatch) -> Result<DispatchOutcome, ActionError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ActionError::Client(crate::client::ClientError::ApiError(
                "no client configured".to_string(),
            )))?;
        let link_dir = self.config.link_dir.as_ref().ok_or(ActionError::MissingLinkDir)?;

        debug!(
            searchee = %matched.searchee.name,
            phase = InjectionPhase::Pending.as_str(),
            "Dispatch start"
        );

        // LINKING: make every file the torrent expects visible under the
        // link directory.
        let plan = plan_links(matched, link_dir)?;
        for (source, dest) in &plan {
            link_file(source, dest, self.config.link_fallback_copy).await?;
        }
        debug!(
            searchee = %matched.searchee.name,
            files = plan.len(),
            phase = InjectionPhase::Linking.as_str(),
            "Data linked"
        );

        // INJECTING: hand to the client.
        debug!(
            searchee = %matched.searchee.name,
            phase = InjectionPhase::Injecting.as_str(),
            "Handing to client"
        );
        let request = InjectRequest {
            torrent: matched.torrent_bytes.clone(),
            name: matched.metadata.name.clone(),
            data_path: Some(link_dir.clone()),
            category: self.config.category.clone(),
            tags: self.config.tags.clone(),
        };
        let result = client.lock().await.add_torrent(request).await?;

        match result.status {
            InjectStatus::Added => {
                info!(
                    searchee = %matched.searchee.name,
                    torrent = %matched.metadata.name,
                    info_hash = %matched.metadata.info_hash,
                    "Injected cross-seed"
                );
                Ok(DispatchOutcome {
                    phase: InjectionPhase::Success,
                    saved_path: None,
                    attempts: 0,
                })
            }
            InjectStatus::Conflict => {
                // The client had it all along; remember that.
                let key = DecisionKey::new(
                    &matched.searchee.name,
                    &matched.candidate.indexer_id,
                    &matched.candidate.guid,
                );
                self.writer
                    .record(key, Decision::InfoHashAlreadyExists, Some(matched.metadata.info_hash))
                    .await?;
                Ok(DispatchOutcome {
                    phase: InjectionPhase::Conflict,
                    saved_path: None,
                    attempts: 0,
                })
            }
        }
    }
}

/// Pair every file the torrent expects with the local file that backs it,
/// consuming the searchee's `(basename, size)` multiset the same way the
/// matcher did.
fn plan_links(
    matched: &AcceptedMatch,
    link_dir: &std::path::Path,
) -> Result<Vec<(PathBuf, PathBuf)>, ActionError> {
    let root = matched
        .searchee
        .content_root
        .as_deref()
        .ok_or(ActionError::MissingContentRoot)?;
    let root = PathBuf::from(root);

    let mut by_key: HashMap<(&str, u64), Vec<&FileEntry>> = HashMap::new();
    for file in &matched.searchee.files {
        by_key.entry((file.basename(), file.size)).or_default().push(file);
    }
    // Size-only matches pair the lone files regardless of name.
    let size_only = matched.decision == Decision::MatchSizeOnly;

    let mut plan = Vec::with_capacity(matched.metadata.files.len());
    for file in &matched.metadata.files {
        let local = if size_only {
            matched.searchee.files.first()
        } else {
            by_key
                .get_mut(&(file.basename(), file.size))
                .and_then(|bucket| bucket.pop())
        };
        let local = local.ok_or_else(|| ActionError::UnmatchedFile {
            path: file.path.clone(),
            size: file.size,
        })?;

        let source = root.join(&local.path);
        let dest = link_dir.join(&file.path);
        plan.push((source, dest));
    }
    Ok(plan)
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect()
}
