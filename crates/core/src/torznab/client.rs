//! Torznab gateway: one logical client with per-indexer state.
//!
//! Every request flows through the indexer's token bucket. Transient
//! failures back the indexer off with a doubling delay; credential
//! rejections disable it until configuration reload.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::IndexerConfig;

use super::rate_limiter::RateLimiterPool;
use super::response;
use super::types::{
    Candidate, Capabilities, IndexerSnapshot, MetadataFetcher, SearchMode, TorznabError,
    TorznabQuery,
};

/// First backoff applied to a failing indexer.
const BACKOFF_BASE: Duration = Duration::from_secs(60);
/// Backoff ceiling.
const BACKOFF_CEILING: Duration = Duration::from_secs(3600);

struct IndexerRuntime {
    config: IndexerConfig,
    /// Capability document, cached for the process lifetime.
    caps: Option<Capabilities>,
    disabled_until: Option<DateTime<Utc>>,
    next_backoff: Duration,
    /// Set on 401/403; cleared only by configuration reload.
    auth_disabled: bool,
}

impl IndexerRuntime {
    fn new(config: IndexerConfig) -> Self {
        Self {
            config,
            caps: None,
            disabled_until: None,
            next_backoff: BACKOFF_BASE,
            auth_disabled: false,
        }
    }
}

/// Torznab protocol client with per-indexer rate limiting and backoff.
pub struct TorznabGateway {
    client: Client,
    limiters: RateLimiterPool,
    indexers: RwLock<HashMap<String, IndexerRuntime>>,
}

impl TorznabGateway {
    pub fn new(indexers: &[IndexerConfig], timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        let limiters = RateLimiterPool::new(
            indexers
                .iter()
                .map(|i| (i.id.clone(), i.rate_limit_rpm)),
        );
        let runtime = indexers
            .iter()
            .map(|i| (i.id.clone(), IndexerRuntime::new(i.clone())))
            .collect();

        Self {
            client,
            limiters,
            indexers: RwLock::new(runtime),
        }
    }

    /// All configured indexer ids.
    pub async fn indexer_ids(&self) -> Vec<String> {
        self.indexers.read().await.keys().cloned().collect()
    }

    /// Snapshot of gateway state, for persistence and status APIs.
    pub async fn snapshots(&self) -> Vec<IndexerSnapshot> {
        self.indexers
            .read()
            .await
            .values()
            .map(|r| IndexerSnapshot {
                id: r.config.id.clone(),
                url: r.config.url.clone(),
                active: r.config.active && !r.auth_disabled,
                disabled_until: r.disabled_until,
                caps: r.caps.clone(),
            })
            .collect()
    }

    /// Seed a capability document without probing, e.g. restored from the
    /// decision store at startup.
    pub async fn prime_caps(&self, indexer: &str, caps: Capabilities) {
        if let Some(runtime) = self.indexers.write().await.get_mut(indexer) {
            runtime.caps.get_or_insert(caps);
        }
    }

    /// Probe an indexer's capabilities. Cached after the first success.
    pub async fn probe(&self, indexer: &str) -> Result<Capabilities, TorznabError> {
        if let Some(caps) = self
            .indexers
            .read()
            .await
            .get(indexer)
            .ok_or_else(|| TorznabError::IndexerNotFound(indexer.to_string()))?
            .caps
            .clone()
        {
            return Ok(caps);
        }

        let url = {
            let indexers = self.indexers.read().await;
            let runtime = indexers
                .get(indexer)
                .ok_or_else(|| TorznabError::IndexerNotFound(indexer.to_string()))?;
            format!(
                "{}?t=caps&apikey={}",
                runtime.config.url.trim_end_matches('/'),
                urlencoding::encode(&runtime.config.apikey)
            )
        };

        let body = self.request(indexer, &url).await?;
        let caps = response::parse_caps(&String::from_utf8_lossy(&body))?;
        debug!(indexer, ?caps, "Probed indexer capabilities");

        if let Some(runtime) = self.indexers.write().await.get_mut(indexer) {
            runtime.caps = Some(caps.clone());
        }
        Ok(caps)
    }

    /// Execute a search, returning candidates in the order the indexer
    /// declared them.
    pub async fn search(
        &self,
        indexer: &str,
        query: &TorznabQuery,
    ) -> Result<Vec<Candidate>, TorznabError> {
        let url = self.build_search_url(indexer, query).await?;
        let body = self.request(indexer, &url).await?;
        let candidates = response::parse_search(&String::from_utf8_lossy(&body), indexer)?;
        debug!(indexer, results = candidates.len(), "Torznab search complete");
        Ok(candidates)
    }

    /// Fetch a candidate's `.torrent` payload through the same rate limiter
    /// and backoff bookkeeping as searches.
    pub async fn download(&self, indexer: &str, link: &str) -> Result<Vec<u8>, TorznabError> {
        self.request(indexer, link).await
    }

    /// Replace indexer configuration, clearing credential-rejection state.
    /// Rate limiter buckets are rebuilt; capability caches survive for
    /// indexers whose url is unchanged.
    pub async fn reload(&mut self, configs: &[IndexerConfig]) {
        let mut indexers = self.indexers.write().await;
        let old = std::mem::take(&mut *indexers);
        for config in configs {
            let mut runtime = IndexerRuntime::new(config.clone());
            if let Some(previous) = old.get(&config.id) {
                if previous.config.url == config.url {
                    runtime.caps = previous.caps.clone();
                }
            }
            indexers.insert(config.id.clone(), runtime);
        }
        self.limiters =
            RateLimiterPool::new(configs.iter().map(|i| (i.id.clone(), i.rate_limit_rpm)));
    }

    async fn build_search_url(
        &self,
        indexer: &str,
        query: &TorznabQuery,
    ) -> Result<String, TorznabError> {
        let indexers = self.indexers.read().await;
        let runtime = indexers
            .get(indexer)
            .ok_or_else(|| TorznabError::IndexerNotFound(indexer.to_string()))?;

        let mode = query.mode.unwrap_or(SearchMode::Search);
        let mut url = format!(
            "{}?t={}&apikey={}",
            runtime.config.url.trim_end_matches('/'),
            mode.t_value(),
            urlencoding::encode(&runtime.config.apikey)
        );
        if let Some(q) = &query.q {
            url.push_str(&format!("&q={}", urlencoding::encode(q)));
        }
        if let Some(id) = &query.imdbid {
            url.push_str(&format!("&imdbid={}", urlencoding::encode(id)));
        }
        if let Some(id) = &query.tmdbid {
            url.push_str(&format!("&tmdbid={}", urlencoding::encode(id)));
        }
        if let Some(id) = &query.tvdbid {
            url.push_str(&format!("&tvdbid={}", urlencoding::encode(id)));
        }
        if let Some(season) = query.season {
            url.push_str(&format!("&season={season}"));
        }
        if let Some(ep) = query.ep {
            url.push_str(&format!("&ep={ep}"));
        }
        Ok(url)
    }

    /// Gate, rate-limit, and execute one HTTP GET against an indexer.
    async fn request(&self, indexer: &str, url: &str) -> Result<Vec<u8>, TorznabError> {
        self.ensure_usable(indexer).await?;

        if !self.limiters.acquire(indexer).await {
            return Err(TorznabError::IndexerNotFound(indexer.to_string()));
        }

        let result = self.execute(url).await;
        match &result {
            Ok(_) => self.note_success(indexer).await,
            Err(e) if matches!(e, TorznabError::AuthRejected { .. }) => {
                warn!(indexer, error = %e, "Indexer rejected credentials, disabling until reload");
                self.note_auth_rejected(indexer).await;
            }
            Err(e) if e.is_transient() => {
                let until = self.note_failure(indexer).await;
                warn!(indexer, error = %e, disabled_until = %until, "Indexer backed off");
            }
            Err(_) => {}
        }
        result
    }

    async fn execute(&self, url: &str) -> Result<Vec<u8>, TorznabError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                TorznabError::Timeout
            } else {
                TorznabError::ConnectionFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(TorznabError::AuthRejected {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(TorznabError::HttpStatus {
                status: status.as_u16(),
            });
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| TorznabError::ConnectionFailed(e.to_string()))
    }

    async fn ensure_usable(&self, indexer: &str) -> Result<(), TorznabError> {
        let indexers = self.indexers.read().await;
        let runtime = indexers
            .get(indexer)
            .ok_or_else(|| TorznabError::IndexerNotFound(indexer.to_string()))?;

        if !runtime.config.active || runtime.auth_disabled {
            return Err(TorznabError::IndexerAuthDisabled(indexer.to_string()));
        }
        if let Some(until) = runtime.disabled_until {
            if until > Utc::now() {
                return Err(TorznabError::IndexerDisabled {
                    indexer: indexer.to_string(),
                    until,
                });
            }
        }
        Ok(())
    }

    async fn note_success(&self, indexer: &str) {
        if let Some(runtime) = self.indexers.write().await.get_mut(indexer) {
            runtime.disabled_until = None;
            runtime.next_backoff = BACKOFF_BASE;
        }
    }

    /// Apply one backoff step and return the resulting deadline.
    async fn note_failure(&self, indexer: &str) -> DateTime<Utc> {
        let mut indexers = self.indexers.write().await;
        let Some(runtime) = indexers.get_mut(indexer) else {
            return Utc::now();
        };
        let until = Utc::now()
            + chrono::Duration::from_std(runtime.next_backoff).unwrap_or(chrono::Duration::zero());
        runtime.disabled_until = Some(until);
        runtime.next_backoff = (runtime.next_backoff * 2).min(BACKOFF_CEILING);
        until
    }

    async fn note_auth_rejected(&self, indexer: &str) {
        if let Some(runtime) = self.indexers.write().await.get_mut(indexer) {
            runtime.auth_disabled = true;
        }
    }
}

#[async_trait::async_trait]
impl MetadataFetcher for TorznabGateway {
    async fn fetch(&self, indexer_id: &str, link: &str) -> Result<Vec<u8>, TorznabError> {
        self.download(indexer_id, link).await
    }
}

#[async_trait::async_trait]
impl super::types::SearchProvider for TorznabGateway {
    async fn indexer_ids(&self) -> Vec<String> {
        TorznabGateway::indexer_ids(self).await
    }

    async fn probe(&self, indexer: &str) -> Result<Capabilities, TorznabError> {
        TorznabGateway::probe(self, indexer).await
    }

    async fn search(
        &self,
        indexer: &str,
        query: &TorznabQuery,
    ) -> Result<Vec<Candidate>, TorznabError> {
        TorznabGateway::search(self, indexer, query).await
    }

    async fn snapshots(&self) -> Vec<IndexerSnapshot> {
        TorznabGateway::snapshots(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexer(id: &str) -> IndexerConfig {
        IndexerConfig {
            id: id.to_string(),
            url: format!("https://{id}.example/api"),
            apikey: "test key".to_string(),
            rate_limit_rpm: 60,
            active: true,
        }
    }

    fn gateway() -> TorznabGateway {
        TorznabGateway::new(&[indexer("alpha")], Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_build_search_url_text() {
        let gw = gateway();
        let url = gw
            .build_search_url("alpha", &TorznabQuery::text("show name"))
            .await
            .unwrap();
        assert!(url.starts_with("https://alpha.example/api?t=search"));
        assert!(url.contains("apikey=test%20key"));
        assert!(url.contains("q=show%20name"));
    }

    #[tokio::test]
    async fn test_build_search_url_tv_with_ids() {
        let gw = gateway();
        let query = TorznabQuery {
            mode: Some(SearchMode::TvSearch),
            tvdbid: Some("12345".to_string()),
            season: Some(1),
            ep: Some(2),
            ..Default::default()
        };
        let url = gw.build_search_url("alpha", &query).await.unwrap();
        assert!(url.contains("t=tvsearch"));
        assert!(url.contains("tvdbid=12345"));
        assert!(url.contains("season=1"));
        assert!(url.contains("ep=2"));
        assert!(!url.contains("&q="));
    }

    #[tokio::test]
    async fn test_unknown_indexer() {
        let gw = gateway();
        let err = gw.search("missing", &TorznabQuery::text("x")).await.unwrap_err();
        assert!(matches!(err, TorznabError::IndexerNotFound(_)));
    }

    #[tokio::test]
    async fn test_backoff_doubles_to_ceiling() {
        let gw = gateway();
        let first = gw.note_failure("alpha").await;
        assert!(first > Utc::now());

        // Doubling: 60, 120, 240, ... capped at 3600.
        for _ in 0..10 {
            gw.note_failure("alpha").await;
        }
        let backoff = gw.indexers.read().await.get("alpha").unwrap().next_backoff;
        assert_eq!(backoff, BACKOFF_CEILING);
    }

    #[tokio::test]
    async fn test_backoff_blocks_requests_and_resets() {
        let gw = gateway();
        gw.note_failure("alpha").await;

        let err = gw.ensure_usable("alpha").await.unwrap_err();
        assert!(matches!(err, TorznabError::IndexerDisabled { .. }));

        gw.note_success("alpha").await;
        assert!(gw.ensure_usable("alpha").await.is_ok());
        let backoff = gw.indexers.read().await.get("alpha").unwrap().next_backoff;
        assert_eq!(backoff, BACKOFF_BASE);
    }

    #[tokio::test]
    async fn test_auth_rejection_disables_until_reload() {
        let mut gw = gateway();
        gw.note_auth_rejected("alpha").await;
        assert!(matches!(
            gw.ensure_usable("alpha").await.unwrap_err(),
            TorznabError::IndexerAuthDisabled(_)
        ));

        gw.reload(&[indexer("alpha")]).await;
        assert!(gw.ensure_usable("alpha").await.is_ok());
    }

    #[tokio::test]
    async fn test_prime_caps_short_circuits_probe() {
        let gw = gateway();
        let caps = Capabilities {
            search: true,
            ..Default::default()
        };
        gw.prime_caps("alpha", caps.clone()).await;
        // No HTTP server exists; a cache hit is the only way this succeeds.
        assert_eq!(gw.probe("alpha").await.unwrap(), caps);
    }

    #[tokio::test]
    async fn test_snapshots_reflect_state() {
        let gw = gateway();
        gw.note_failure("alpha").await;
        let snapshots = gw.snapshots().await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].id, "alpha");
        assert!(snapshots[0].active);
        assert!(snapshots[0].disabled_until.is_some());

        gw.note_auth_rejected("alpha").await;
        let snapshots = gw.snapshots().await;
        assert!(!snapshots[0].active);
    }
}
