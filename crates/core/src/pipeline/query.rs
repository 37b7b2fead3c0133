//! Query selection: the best Torznab query an indexer's capabilities allow
//! for a given release.

use crate::arr::ExternalIds;
use crate::release::{MediaType, ParsedRelease};
use crate::torznab::{Capabilities, IdKind, SearchMode, TorznabQuery};

/// Build the best query for one indexer, or `None` when the indexer
/// supports no usable search mode.
///
/// Id search is preferred when the arr resolved an id the indexer accepts;
/// otherwise the cleaned title goes out as text. TV queries carry season
/// and episode parameters either way.
pub fn build_query(
    parsed: &ParsedRelease,
    ids: &ExternalIds,
    caps: &Capabilities,
) -> Option<TorznabQuery> {
    let mode = match parsed.media_type {
        MediaType::Episode | MediaType::Season | MediaType::Anime if caps.tv_search => {
            SearchMode::TvSearch
        }
        MediaType::Movie if caps.movie_search => SearchMode::MovieSearch,
        _ if caps.search => SearchMode::Search,
        _ => return None,
    };

    let mut query = TorznabQuery {
        mode: Some(mode),
        ..Default::default()
    };

    if mode == SearchMode::TvSearch {
        query.season = parsed.season;
        query.ep = parsed.episode;
    }

    let id_applied = match mode {
        SearchMode::TvSearch => apply_id(&mut query, ids, caps, &[IdKind::Tvdb, IdKind::Imdb]),
        SearchMode::MovieSearch => {
            apply_id(&mut query, ids, caps, &[IdKind::Imdb, IdKind::Tmdb])
        }
        SearchMode::Search => false,
    };

    if !id_applied {
        query.q = Some(parsed.title.clone());
    }
    Some(query)
}

fn apply_id(
    query: &mut TorznabQuery,
    ids: &ExternalIds,
    caps: &Capabilities,
    preference: &[IdKind],
) -> bool {
    for kind in preference {
        if !caps.id_params.contains(kind) {
            continue;
        }
        match kind {
            IdKind::Imdb => {
                if let Some(id) = &ids.imdb_id {
                    query.imdbid = Some(id.clone());
                    return true;
                }
            }
            IdKind::Tmdb => {
                if let Some(id) = ids.tmdb_id {
                    query.tmdbid = Some(id.to_string());
                    return true;
                }
            }
            IdKind::Tvdb => {
                if let Some(id) = ids.tvdb_id {
                    query.tvdbid = Some(id.to_string());
                    return true;
                }
            }
        }
    }
    false
}
