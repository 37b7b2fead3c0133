//! Release name parsing.
//!
//! Extracts media metadata (title, year, season/episode, resolution,
//! release group, repack flags) from scene-style release names and
//! classifies them for query routing.

mod parser;
mod types;

pub use parser::{parse, title_tokens};
pub use types::*;
