//! Torznab indexer gateway.
//!
//! Capability probing, search dispatch, response parsing, `.torrent`
//! download, per-indexer rate limiting, and failure backoff.

mod client;
mod rate_limiter;
mod response;
mod types;

pub use client::TorznabGateway;
pub use rate_limiter::{RateLimiterPool, TokenBucket};
pub use response::{parse_caps, parse_search};
pub use types::*;
