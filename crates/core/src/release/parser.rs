//! Regex-driven release name parser.
//!
//! Parsing is deterministic and idempotent: feeding an extracted title back
//! through the parser reproduces the same title, because titles are cut
//! before the first structural marker and contain none themselves.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::types::{MediaType, ParsedRelease};

static SEASON_EPISODE: Lazy<Regex> = Lazy::new(|| {
    // S01E02, S01E02-E04, S01.E02, 1x02
    Regex::new(r"(?i)\b(?:S(\d{1,2})[ ._-]?E(\d{1,3})(?:[-_]?E?\d{1,3})?|(\d{1,2})x(\d{2,3}))\b")
        .expect("season/episode pattern")
});

static SEASON_PACK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bS(\d{1,2})\b").expect("season pack pattern"));

static YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").expect("year pattern"));

static RESOLUTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(480p|576p|720p|1080p|2160p|4k)\b").expect("resolution pattern")
});

static GROUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-([A-Za-z0-9]+)\s*$").expect("group pattern"));

static REPACK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bREPACK\b").expect("repack pattern"));

static PROPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:PROPER|REAL)\b").expect("proper pattern"));

static ANIME_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[[^\]]+\]").expect("anime prefix pattern"));

static ANIME_ABSOLUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" - (\d{2,4})\b").expect("anime absolute pattern"));

/// Parse a release name into its metadata.
pub fn parse(name: &str) -> ParsedRelease {
    let normalized = normalize_separators(name);

    let mut season = None;
    let mut episode = None;
    let mut structural_start: Option<usize> = None;

    if let Some(caps) = SEASON_EPISODE.captures(&normalized) {
        let m = caps.get(0).expect("whole match");
        structural_start = Some(m.start());
        if let (Some(s), Some(e)) = (caps.get(1), caps.get(2)) {
            season = s.as_str().parse().ok();
            episode = e.as_str().parse().ok();
        } else if let (Some(s), Some(e)) = (caps.get(3), caps.get(4)) {
            season = s.as_str().parse().ok();
            episode = e.as_str().parse().ok();
        }
    } else if let Some(caps) = SEASON_PACK.captures(&normalized) {
        let m = caps.get(0).expect("whole match");
        structural_start = Some(m.start());
        season = caps.get(1).and_then(|s| s.as_str().parse().ok());
    }

    let resolution = RESOLUTION
        .captures(&normalized)
        .map(|c| c.get(1).expect("resolution group").as_str().to_lowercase());
    if let Some(m) = RESOLUTION.find(&normalized) {
        structural_start = Some(structural_start.map_or(m.start(), |s| s.min(m.start())));
    }

    // The year marker only delimits the title when it is not the leading
    // token, so year-titled releases ("2012 1080p-GRP") keep their title.
    let mut year = None;
    for caps in YEAR.captures_iter(&normalized) {
        let m = caps.get(1).expect("year group");
        year = m.as_str().parse().ok();
        if m.start() > 0 {
            structural_start = Some(structural_start.map_or(m.start(), |s| s.min(m.start())));
        }
    }

    let anime = ANIME_PREFIX.is_match(name.trim_start())
        && episode.is_none()
        && ANIME_ABSOLUTE.is_match(&normalized);

    let title = match structural_start {
        Some(pos) if pos > 0 => clean_title(&normalized[..pos]),
        Some(_) => clean_title(&normalized),
        None => clean_title(&normalized),
    };

    let group = GROUP
        .captures(normalized.trim_end())
        .map(|c| c.get(1).expect("group capture").as_str().to_string());

    let media_type = if anime {
        MediaType::Anime
    } else if episode.is_some() {
        MediaType::Episode
    } else if season.is_some() {
        MediaType::Season
    } else if year.is_some() {
        MediaType::Movie
    } else {
        MediaType::Other
    };

    ParsedRelease {
        title,
        year,
        season,
        episode,
        resolution,
        group,
        repack: REPACK.is_match(&normalized),
        proper: PROPER.is_match(&normalized),
        media_type,
    }
}

/// Lowercased alphanumeric tokens of a name, for fuzzy title comparison.
pub fn title_tokens(name: &str) -> Vec<String> {
    normalize_separators(name)
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_separators(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if c == '.' || c == '_' { ' ' } else { c })
        .collect();
    collapse_spaces(&replaced)
}

fn clean_title(raw: &str) -> String {
    // Strip bracketed noise ([Group], [720p]) and dangling separators.
    let mut out = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    collapse_spaces(out.trim_matches(|c: char| c.is_whitespace() || c == '-'))
}

fn collapse_spaces(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = false;
    for c in s.trim().chars() {
        if c == ' ' {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_episode() {
        let parsed = parse("Show.Name.S01E02.1080p.WEB.H264-GRP");
        assert_eq!(parsed.title, "Show Name");
        assert_eq!(parsed.season, Some(1));
        assert_eq!(parsed.episode, Some(2));
        assert_eq!(parsed.resolution.as_deref(), Some("1080p"));
        assert_eq!(parsed.group.as_deref(), Some("GRP"));
        assert_eq!(parsed.media_type, MediaType::Episode);
    }

    #[test]
    fn test_parse_season_pack() {
        let parsed = parse("Show.Name.S02.2160p.BluRay-GRP");
        assert_eq!(parsed.title, "Show Name");
        assert_eq!(parsed.season, Some(2));
        assert_eq!(parsed.episode, None);
        assert_eq!(parsed.media_type, MediaType::Season);
    }

    #[test]
    fn test_parse_episode_range() {
        let parsed = parse("Show.S01E01-E03.720p-GRP");
        assert_eq!(parsed.season, Some(1));
        assert_eq!(parsed.episode, Some(1));
        assert_eq!(parsed.media_type, MediaType::Episode);
    }

    #[test]
    fn test_parse_x_shorthand() {
        let parsed = parse("Show Name 3x07 HDTV");
        assert_eq!(parsed.season, Some(3));
        assert_eq!(parsed.episode, Some(7));
    }

    #[test]
    fn test_parse_movie() {
        let parsed = parse("Some.Movie.2019.1080p.BluRay.x264-GRP");
        assert_eq!(parsed.title, "Some Movie");
        assert_eq!(parsed.year, Some(2019));
        assert_eq!(parsed.season, None);
        assert_eq!(parsed.media_type, MediaType::Movie);
    }

    #[test]
    fn test_parse_year_titled_movie_keeps_title() {
        let parsed = parse("2012.2009.1080p-GRP");
        assert_eq!(parsed.title, "2012");
        assert_eq!(parsed.year, Some(2009));
        assert_eq!(parsed.media_type, MediaType::Movie);
    }

    #[test]
    fn test_parse_other_fallback() {
        let parsed = parse("Linux ISO Collection");
        assert_eq!(parsed.title, "Linux ISO Collection");
        assert_eq!(parsed.media_type, MediaType::Other);
        assert_eq!(parsed.year, None);
    }

    #[test]
    fn test_parse_anime() {
        let parsed = parse("[SubGroup] Some Show - 012 [720p]");
        assert_eq!(parsed.media_type, MediaType::Anime);
        assert_eq!(parsed.resolution.as_deref(), Some("720p"));
    }

    #[test]
    fn test_parse_repack_proper() {
        assert!(parse("Show.S01E01.REPACK.1080p-GRP").repack);
        assert!(parse("Show.S01E01.PROPER.1080p-GRP").proper);
        assert!(parse("Show.S01E01.REAL.PROPER-GRP").proper);
        assert!(!parse("Show.S01E01-GRP").repack);
    }

    #[test]
    fn test_parse_is_idempotent() {
        for name in [
            "Show.Name.S01E02.1080p.WEB.H264-GRP",
            "Some.Movie.2019.1080p.BluRay.x264-GRP",
            "Linux ISO Collection",
            "[SubGroup] Some Show - 012 [720p]",
        ] {
            let first = parse(name);
            let second = parse(&first.title);
            assert_eq!(first.title, second.title, "title not idempotent for {name}");
        }
    }

    #[test]
    fn test_parse_deterministic() {
        let a = parse("Show.Name.S01E02.1080p.WEB.H264-GRP");
        let b = parse("Show.Name.S01E02.1080p.WEB.H264-GRP");
        assert_eq!(a, b);
    }

    #[test]
    fn test_title_tokens() {
        assert_eq!(
            title_tokens("Show.Name.S01E02-GRP"),
            vec!["show", "name", "s01e02", "grp"]
        );
        assert_eq!(title_tokens("  "), Vec::<String>::new());
    }

    #[test]
    fn test_underscores_normalized() {
        let parsed = parse("Show_Name_S01E01_720p-GRP");
        assert_eq!(parsed.title, "Show Name");
        assert_eq!(parsed.season, Some(1));
    }
}
