//! Action dispatch for accepted matches.
//!
//! SAVE mode writes the fetched `.torrent` to the output directory. INJECT
//! mode links the matched data into the client's expected layout and hands
//! the torrent to the client adapter, retrying client failures with
//! exponential backoff.

mod dispatcher;
mod linker;
mod types;

pub use dispatcher::ActionDispatcher;
pub use linker::{link_file, same_device, LinkMethod};
pub use types::*;
