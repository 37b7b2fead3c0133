//! Mock torrent client.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::client::{
    ClientError, ClientTorrent, InjectRequest, InjectResult, InjectStatus, TorrentClient,
};
use crate::metainfo::InfoHash;

#[derive(Default)]
struct ClientState {
    existing: HashSet<InfoHash>,
    torrents: Vec<ClientTorrent>,
    added: Vec<InjectRequest>,
    add_attempts: usize,
    fail_adds: bool,
}

/// In-memory torrent client. Clones share state, so a test can hand one
/// clone to the dispatcher and inspect the other.
#[derive(Clone, Default)]
pub struct MockTorrentClient {
    state: Arc<Mutex<ClientState>>,
}

impl MockTorrentClient {
    /// Mark an info-hash as already present in the client.
    pub fn seed_existing(&self, info_hash: InfoHash) {
        self.state.lock().unwrap().existing.insert(info_hash);
    }

    /// Add a torrent to the client's listing.
    pub fn seed_torrent(&self, torrent: ClientTorrent) {
        let mut state = self.state.lock().unwrap();
        state.existing.insert(torrent.info_hash);
        state.torrents.push(torrent);
    }

    /// Make every subsequent add fail with an API error.
    pub fn fail_adds(&self) {
        self.state.lock().unwrap().fail_adds = true;
    }

    /// Successfully injected requests.
    pub fn added(&self) -> Vec<InjectRequest> {
        self.state.lock().unwrap().added.clone()
    }

    /// Total add attempts, including failed ones.
    pub fn add_attempts(&self) -> usize {
        self.state.lock().unwrap().add_attempts
    }
}

#[async_trait]
impl TorrentClient for MockTorrentClient {
    fn name(&self) -> &str {
        "mock"
    }

    async fn add_torrent(&self, request: InjectRequest) -> Result<InjectResult, ClientError> {
        let mut state = self.state.lock().unwrap();
        state.add_attempts += 1;
        if state.fail_adds {
            return Err(ClientError::ApiError("simulated failure".to_string()));
        }

        let info_hash = crate::metainfo::parse(&request.torrent)
            .map_err(|e| ClientError::ApiError(e.to_string()))?
            .info_hash;
        if state.existing.contains(&info_hash) {
            return Ok(InjectResult {
                status: InjectStatus::Conflict,
                client_torrent_id: None,
            });
        }

        state.existing.insert(info_hash);
        state.added.push(request);
        Ok(InjectResult {
            status: InjectStatus::Added,
            client_torrent_id: Some(info_hash.to_hex()),
        })
    }

    async fn get_torrents(&self) -> Result<Vec<ClientTorrent>, ClientError> {
        Ok(self.state.lock().unwrap().torrents.clone())
    }

    async fn check_exists(&self, info_hash: &InfoHash) -> Result<bool, ClientError> {
        Ok(self.state.lock().unwrap().existing.contains(info_hash))
    }
}
