//! Sonarr/Radarr id resolution.
//!
//! Used only to turn release titles into external ids (IMDb/TMDB/TVDB) so
//! indexers supporting id search get precise queries. Errors degrade to
//! textual search and never abort the pipeline.

mod client;
mod types;

pub use client::ArrGateway;
pub use types::*;
