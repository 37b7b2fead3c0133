//! Mock search provider.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::torznab::{
    Candidate, Capabilities, IndexerSnapshot, SearchProvider, TorznabError, TorznabQuery,
};

#[derive(Default)]
struct ProviderState {
    caps: HashMap<String, Capabilities>,
    results: HashMap<String, Vec<Candidate>>,
    fail_searches: bool,
    queries: Vec<(String, TorznabQuery)>,
}

/// Serves canned candidates per indexer and records the queries it saw.
#[derive(Clone, Default)]
pub struct MockSearchProvider {
    state: Arc<Mutex<ProviderState>>,
}

impl MockSearchProvider {
    /// Register an indexer with full textual search capability.
    pub fn add_indexer(&self, id: &str) {
        self.set_caps(
            id,
            Capabilities {
                search: true,
                tv_search: true,
                movie_search: true,
                ..Default::default()
            },
        );
    }

    pub fn set_caps(&self, id: &str, caps: Capabilities) {
        self.state.lock().unwrap().caps.insert(id.to_string(), caps);
    }

    /// Candidates returned for every search against `id`.
    pub fn set_results(&self, id: &str, candidates: Vec<Candidate>) {
        self.state
            .lock()
            .unwrap()
            .results
            .insert(id.to_string(), candidates);
    }

    pub fn fail_searches(&self) {
        self.state.lock().unwrap().fail_searches = true;
    }

    /// All `(indexer, query)` pairs seen so far.
    pub fn queries(&self) -> Vec<(String, TorznabQuery)> {
        self.state.lock().unwrap().queries.clone()
    }
}

#[async_trait]
impl SearchProvider for MockSearchProvider {
    async fn indexer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().unwrap().caps.keys().cloned().collect();
        ids.sort();
        ids
    }

    async fn probe(&self, indexer: &str) -> Result<Capabilities, TorznabError> {
        self.state
            .lock()
            .unwrap()
            .caps
            .get(indexer)
            .cloned()
            .ok_or_else(|| TorznabError::IndexerNotFound(indexer.to_string()))
    }

    async fn search(
        &self,
        indexer: &str,
        query: &TorznabQuery,
    ) -> Result<Vec<Candidate>, TorznabError> {
        let mut state = self.state.lock().unwrap();
        state.queries.push((indexer.to_string(), query.clone()));
        if state.fail_searches {
            return Err(TorznabError::HttpStatus { status: 503 });
        }
        Ok(state.results.get(indexer).cloned().unwrap_or_default())
    }

    async fn snapshots(&self) -> Vec<IndexerSnapshot> {
        let state = self.state.lock().unwrap();
        state
            .caps
            .iter()
            .map(|(id, caps)| IndexerSnapshot {
                id: id.clone(),
                url: format!("https://{id}.example/api"),
                active: true,
                disabled_until: None,
                caps: Some(caps.clone()),
            })
            .collect()
    }
}
