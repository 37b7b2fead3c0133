//! Types for the Torznab indexer gateway.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metainfo::InfoHash;

/// Errors from talking to an indexer. Each is scoped to one indexer and one
/// request; none of them aborts the pipeline.
#[derive(Debug, Error)]
pub enum TorznabError {
    #[error("Request timeout")]
    Timeout,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("HTTP {status} from indexer")]
    HttpStatus { status: u16 },

    #[error("Indexer rejected credentials (HTTP {status})")]
    AuthRejected { status: u16 },

    #[error("Malformed response: {0}")]
    MalformedXml(String),

    #[error("Response missing required field: {0}")]
    MissingField(&'static str),

    #[error("Unknown indexer: {0}")]
    IndexerNotFound(String),

    #[error("Indexer {indexer} is disabled until {until}")]
    IndexerDisabled {
        indexer: String,
        until: DateTime<Utc>,
    },

    #[error("Indexer {0} disabled until configuration reload")]
    IndexerAuthDisabled(String),
}

impl TorznabError {
    /// Transient failures back the indexer off; permanent ones disable it.
    pub fn is_transient(&self) -> bool {
        match self {
            TorznabError::Timeout
            | TorznabError::ConnectionFailed(_)
            | TorznabError::MalformedXml(_)
            | TorznabError::MissingField(_) => true,
            TorznabError::HttpStatus { status } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// External id kinds an indexer can search by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Imdb,
    Tmdb,
    Tvdb,
}

impl IdKind {
    /// Torznab query parameter name.
    pub fn param(&self) -> &'static str {
        match self {
            IdKind::Imdb => "imdbid",
            IdKind::Tmdb => "tmdbid",
            IdKind::Tvdb => "tvdbid",
        }
    }
}

/// Search modes advertised by `t=caps`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Search,
    TvSearch,
    MovieSearch,
}

impl SearchMode {
    /// The `t` query parameter value.
    pub fn t_value(&self) -> &'static str {
        match self {
            SearchMode::Search => "search",
            SearchMode::TvSearch => "tvsearch",
            SearchMode::MovieSearch => "movie",
        }
    }
}

/// Capabilities discovered from an indexer's `t=caps` document. Cached for
/// the process lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub search: bool,
    pub tv_search: bool,
    pub movie_search: bool,
    /// Id params the indexer accepts on any search mode.
    pub id_params: BTreeSet<IdKind>,
    /// Advertised categories, `(id, name)`.
    pub categories: Vec<(i64, String)>,
}

impl Capabilities {
    pub fn supports_mode(&self, mode: SearchMode) -> bool {
        match mode {
            SearchMode::Search => self.search,
            SearchMode::TvSearch => self.tv_search,
            SearchMode::MovieSearch => self.movie_search,
        }
    }
}

/// One Torznab search request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TorznabQuery {
    pub mode: Option<SearchMode>,
    pub q: Option<String>,
    pub imdbid: Option<String>,
    pub tmdbid: Option<String>,
    pub tvdbid: Option<String>,
    pub season: Option<u16>,
    pub ep: Option<u16>,
}

impl TorznabQuery {
    /// Plain text search.
    pub fn text(q: impl Into<String>) -> Self {
        Self {
            mode: Some(SearchMode::Search),
            q: Some(q.into()),
            ..Default::default()
        }
    }

    pub fn has_id(&self) -> bool {
        self.imdbid.is_some() || self.tmdbid.is_some() || self.tvdbid.is_some()
    }
}

/// A release advertised by an indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Which indexer returned it.
    pub indexer_id: String,
    /// Indexer-local unique id.
    pub guid: String,
    pub name: String,
    pub size: u64,
    /// Download URL or magnet.
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<DateTime<Utc>>,
    /// Info-hash advertised by the indexer, when present. Advisory only;
    /// the matcher trusts the hash of the fetched metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info_hash_hint: Option<InfoHash>,
}

/// Fetches a candidate's `.torrent` payload. The seam between the matcher
/// and the gateway, mockable in tests.
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    async fn fetch(&self, indexer_id: &str, link: &str) -> Result<Vec<u8>, TorznabError>;
}

/// Search surface the pipeline consumes. Implemented by the gateway and by
/// mocks in tests.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn indexer_ids(&self) -> Vec<String>;

    async fn probe(&self, indexer: &str) -> Result<Capabilities, TorznabError>;

    async fn search(
        &self,
        indexer: &str,
        query: &TorznabQuery,
    ) -> Result<Vec<Candidate>, TorznabError>;

    async fn snapshots(&self) -> Vec<IndexerSnapshot>;
}

/// Gateway-side snapshot of one indexer, for status APIs and persistence.
#[derive(Debug, Clone, Serialize)]
pub struct IndexerSnapshot {
    pub id: String,
    pub url: String,
    pub active: bool,
    pub disabled_until: Option<DateTime<Utc>>,
    pub caps: Option<Capabilities>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_t_values() {
        assert_eq!(SearchMode::Search.t_value(), "search");
        assert_eq!(SearchMode::TvSearch.t_value(), "tvsearch");
        assert_eq!(SearchMode::MovieSearch.t_value(), "movie");
    }

    #[test]
    fn test_transient_classification() {
        assert!(TorznabError::Timeout.is_transient());
        assert!(TorznabError::HttpStatus { status: 429 }.is_transient());
        assert!(TorznabError::HttpStatus { status: 503 }.is_transient());
        assert!(!TorznabError::HttpStatus { status: 404 }.is_transient());
        assert!(!TorznabError::AuthRejected { status: 401 }.is_transient());
        assert!(TorznabError::MalformedXml("x".into()).is_transient());
    }

    #[test]
    fn test_capabilities_mode_support() {
        let caps = Capabilities {
            search: true,
            tv_search: true,
            movie_search: false,
            ..Default::default()
        };
        assert!(caps.supports_mode(SearchMode::Search));
        assert!(caps.supports_mode(SearchMode::TvSearch));
        assert!(!caps.supports_mode(SearchMode::MovieSearch));
    }

    #[test]
    fn test_query_text_constructor() {
        let query = TorznabQuery::text("show name");
        assert_eq!(query.mode, Some(SearchMode::Search));
        assert_eq!(query.q.as_deref(), Some("show name"));
        assert!(!query.has_id());
    }
}
