//! Mock metadata fetcher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::torznab::{MetadataFetcher, TorznabError};

type FailureFactory = Box<dyn Fn() -> TorznabError + Send + Sync>;

#[derive(Default)]
struct FetcherState {
    responses: HashMap<String, Vec<u8>>,
    failures: HashMap<String, FailureFactory>,
}

/// Serves canned `.torrent` payloads by link. Unserved links fail with a
/// connection error.
#[derive(Clone, Default)]
pub struct MockFetcher {
    state: Arc<Mutex<FetcherState>>,
    requests: Arc<AtomicUsize>,
}

impl MockFetcher {
    /// Serve a payload for the link, clearing any configured failure.
    pub fn serve(&self, link: &str, bytes: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        state.failures.remove(link);
        state.responses.insert(link.to_string(), bytes);
    }

    pub fn fail_with(
        &self,
        link: &str,
        factory: impl Fn() -> TorznabError + Send + Sync + 'static,
    ) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(link.to_string(), Box::new(factory));
    }

    /// Number of fetch calls seen.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataFetcher for MockFetcher {
    async fn fetch(&self, _indexer_id: &str, link: &str) -> Result<Vec<u8>, TorznabError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if let Some(factory) = state.failures.get(link) {
            return Err(factory());
        }
        state
            .responses
            .get(link)
            .cloned()
            .ok_or_else(|| TorznabError::ConnectionFailed(format!("unserved link {link}")))
    }
}
