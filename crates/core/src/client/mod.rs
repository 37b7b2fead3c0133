//! BitTorrent client abstraction.
//!
//! The dispatcher only needs three capabilities: add a torrent against
//! existing data, list what the client already seeds, and check for an
//! info-hash. Adapters (qBittorrent here; Transmission, Deluge, rTorrent
//! are implementable behind the same trait) are assumed non-thread-safe
//! and are driven behind a per-client mutex.

mod qbittorrent;
mod types;

pub use qbittorrent::QBittorrentClient;
pub use types::*;
