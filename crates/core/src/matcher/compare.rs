//! Pure comparison core.
//!
//! Everything here is a deterministic function of file lists, sizes, and
//! the match configuration. No I/O, no clocks: the same inputs always
//! produce the same verdict.

use std::collections::HashMap;

use crate::config::MatchConfig;
use crate::decision::Decision;
use crate::metainfo::{FileEntry, TorrentMetadata};
use crate::searchee::Searchee;

/// Result of comparing a candidate's file tree against a searchee's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeComparison {
    /// Same multiset of `(basename, size)` pairs.
    Full,
    /// The candidate's files are a subset of the searchee's covering
    /// `matched_size` of the candidate's `total_size` bytes.
    Partial { matched_size: u64, total_size: u64 },
    /// Single-file candidate whose size equals the searchee's single file,
    /// under a different name.
    SizeOnly,
    Mismatch,
}

/// Size prefilter: a candidate within `fuzz * total` of the searchee's
/// total size passes, boundary inclusive.
pub fn size_within_fuzz(candidate_size: u64, searchee_total: u64, fuzz: f64) -> bool {
    let delta = candidate_size.abs_diff(searchee_total) as f64;
    delta <= fuzz * searchee_total as f64
}

/// Compare file trees by `(basename, size)` multiset. Directory layout is
/// irrelevant: a season pack laid out flat locally still matches its
/// per-episode directory structure on the candidate side.
pub fn compare_trees(
    searchee_files: &[FileEntry],
    candidate_files: &[FileEntry],
    config: &MatchConfig,
) -> TreeComparison {
    // Multiset index of the searchee's files.
    let mut index: HashMap<(&str, u64), u32> = HashMap::new();
    for file in searchee_files {
        *index.entry((file.basename(), file.size)).or_insert(0) += 1;
    }

    let mut matched_count = 0usize;
    let mut matched_size = 0u64;
    let total_size: u64 = candidate_files.iter().map(|f| f.size).sum();

    for file in candidate_files {
        if let Some(count) = index.get_mut(&(file.basename(), file.size)) {
            if *count > 0 {
                *count -= 1;
                matched_count += 1;
                matched_size += file.size;
            }
        }
    }

    if matched_count == candidate_files.len() && candidate_files.len() == searchee_files.len() {
        return TreeComparison::Full;
    }

    if config.allow_partial && total_size > 0 {
        let coverage = matched_size as f64 / total_size as f64;
        if coverage >= config.partial_threshold {
            return TreeComparison::Partial {
                matched_size,
                total_size,
            };
        }
    }

    if config.allow_size_only
        && candidate_files.len() == 1
        && searchee_files.len() == 1
        && candidate_files[0].size == searchee_files[0].size
    {
        return TreeComparison::SizeOnly;
    }

    TreeComparison::Mismatch
}

/// The pure decision: a function of the searchee's file list and info-hash,
/// the fetched metadata, whether the hash is already known locally, and the
/// configuration. Steps 3 and 4 of the matching algorithm; the size
/// prefilter and fetch happen before metadata exists, linking feasibility
/// after.
pub fn decide_from_metadata(
    searchee: &Searchee,
    metadata: &TorrentMetadata,
    hash_known: bool,
    config: &MatchConfig,
) -> Decision {
    if hash_known || searchee.info_hash == Some(metadata.info_hash) {
        return Decision::InfoHashAlreadyExists;
    }

    match compare_trees(&searchee.files, &metadata.files, config) {
        TreeComparison::Full => Decision::Match,
        TreeComparison::Partial { .. } => Decision::MatchPartial,
        TreeComparison::SizeOnly => Decision::MatchSizeOnly,
        TreeComparison::Mismatch => Decision::FileTreeMismatch,
    }
}
