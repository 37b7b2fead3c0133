//! Persistent decision cache.
//!
//! Records every `(searchee, indexer, guid)` verdict so repeated scans skip
//! work, plus per-searchee search timestamps for the scheduler, indexer
//! bookkeeping, and job status rows. Decisions are authoritative: the
//! matcher consults this cache before any network I/O.

mod sqlite;
mod types;
mod writer;

pub use sqlite::SqliteDecisionStore;
pub use types::*;
pub use writer::DecisionWriter;
