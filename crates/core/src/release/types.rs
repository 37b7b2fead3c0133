//! Types for parsed release names.

use serde::{Deserialize, Serialize};

/// Media classification of a release name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Movie,
    Episode,
    Season,
    Anime,
    /// Fallback when neither TV nor movie structure was identified.
    Other,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Episode => "episode",
            MediaType::Season => "season",
            MediaType::Anime => "anime",
            MediaType::Other => "other",
        }
    }

    /// Whether arr id resolution should ask Sonarr for this type.
    pub fn is_tv(&self) -> bool {
        matches!(self, MediaType::Episode | MediaType::Season | MediaType::Anime)
    }
}

/// Metadata extracted from a release name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedRelease {
    /// Canonical title with separators normalized to spaces.
    pub title: String,
    pub year: Option<u16>,
    pub season: Option<u16>,
    pub episode: Option<u16>,
    /// Resolution token as found, lowercased (e.g. "1080p", "4k").
    pub resolution: Option<String>,
    /// Trailing `-GROUP` token.
    pub group: Option<String>,
    pub repack: bool,
    pub proper: bool,
    pub media_type: MediaType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_as_str() {
        assert_eq!(MediaType::Movie.as_str(), "movie");
        assert_eq!(MediaType::Episode.as_str(), "episode");
        assert_eq!(MediaType::Season.as_str(), "season");
        assert_eq!(MediaType::Anime.as_str(), "anime");
        assert_eq!(MediaType::Other.as_str(), "other");
    }

    #[test]
    fn test_is_tv() {
        assert!(MediaType::Episode.is_tv());
        assert!(MediaType::Season.is_tv());
        assert!(MediaType::Anime.is_tv());
        assert!(!MediaType::Movie.is_tv());
        assert!(!MediaType::Other.is_tv());
    }
}
