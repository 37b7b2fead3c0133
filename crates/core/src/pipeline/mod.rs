//! Search pipeline.
//!
//! Orchestrates one cycle per searchee: pick the next due searchee, build
//! the best query per indexer, fan searches out under a global concurrency
//! cap, stream candidates through the matcher, and hand accepted matches
//! to the action dispatcher. Decisions for the same key are single-flight;
//! acceptance within a cycle is deduplicated by info-hash.

mod query;
mod runner;
mod singleflight;

pub use query::build_query;
pub use runner::{CycleSummary, PipelineError, PipelineStatus, SearchPipeline};
pub use singleflight::SingleFlight;
