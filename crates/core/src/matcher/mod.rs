//! Match adjudication.
//!
//! Decides whether a candidate release's bytes are equal to (or a usable
//! subset of) a searchee's bytes. The comparison core in `compare` is a
//! pure function of file lists, sizes, and configuration; `engine` wraps it
//! with cache consultation, metadata fetching, and decision persistence.

mod compare;
mod engine;
mod types;

pub use compare::{compare_trees, decide_from_metadata, size_within_fuzz, TreeComparison};
pub use engine::MatchEngine;
pub use types::*;
