//! reseeder core: the cross-seed matching and dispatch pipeline.
//!
//! Given local content (torrent files, data directories, or torrents
//! reported by a BitTorrent client), the pipeline queries Torznab indexers
//! for alternate sources of the same bytes, adjudicates candidates by
//! file-level comparison, and injects accepted matches into a client (or
//! saves their `.torrent` files) so the existing data seeds on additional
//! trackers.

pub mod action;
pub mod announce;
pub mod arr;
pub mod client;
pub mod config;
pub mod decision;
pub mod matcher;
pub mod metainfo;
pub mod pipeline;
pub mod release;
pub mod searchee;
pub mod testing;
pub mod torznab;

pub use config::{load_config, validate_config, Config, ConfigError, SanitizedConfig};
pub use decision::{Decision, DecisionStore, DecisionWriter, SqliteDecisionStore};
pub use matcher::MatchEngine;
pub use pipeline::{PipelineError, SearchPipeline};
pub use searchee::Searchee;
