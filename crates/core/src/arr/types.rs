//! Types for the arr parse endpoint.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from an arr instance. All are recoverable mid-pipeline; only the
/// startup probe treats them as fatal.
#[derive(Debug, Error)]
pub enum ArrError {
    #[error("Request timeout")]
    Timeout,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("HTTP {status} from arr")]
    HttpStatus { status: u16 },

    #[error("Failed to parse arr response: {0}")]
    ParseError(String),

    #[error("No arr instances configured")]
    NotConfigured,
}

/// External ids resolved for a title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIds {
    pub imdb_id: Option<String>,
    pub tmdb_id: Option<u64>,
    pub tvdb_id: Option<u64>,
}

impl ExternalIds {
    /// Whether any id was resolved.
    pub fn any(&self) -> bool {
        self.imdb_id.is_some() || self.tmdb_id.is_some() || self.tvdb_id.is_some()
    }
}

/// Response shape of `GET {arr}/api/v3/parse`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResponse {
    #[serde(default)]
    pub movie: Option<ParsedEntity>,
    #[serde(default)]
    pub series: Option<ParsedEntity>,
}

/// Ids carried on the parsed movie/series entity.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedEntity {
    #[serde(default)]
    pub imdb_id: Option<String>,
    #[serde(default)]
    pub tmdb_id: Option<u64>,
    #[serde(default)]
    pub tvdb_id: Option<u64>,
}

impl ParseResponse {
    /// Ids from whichever entity the arr recognized.
    pub fn into_ids(self) -> ExternalIds {
        let entity = self.movie.or(self.series).unwrap_or_default();
        ExternalIds {
            // Empty-string ids show up for unknown titles; treat as absent.
            imdb_id: entity.imdb_id.filter(|s| !s.is_empty()),
            tmdb_id: entity.tmdb_id.filter(|&id| id != 0),
            tvdb_id: entity.tvdb_id.filter(|&id| id != 0),
        }
    }
}

/// Response shape of the `{arr}/api` connectivity ping.
#[derive(Debug, Clone, Deserialize)]
pub struct PingResponse {
    /// Current API version; presence of the field validates the endpoint.
    pub current: String,
}
