//! Local content model.
//!
//! A `Searchee` is the normalized description of something the user already
//! has: a parsed torrent file, a data directory, or a torrent reported by a
//! connected client. It is the authoritative reference the matcher compares
//! candidates against.

mod source;
mod types;

pub use source::{from_client_torrent, from_data_dir, from_torrent_bytes, from_torrent_path};
pub use types::*;
