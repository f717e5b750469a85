//! Exact-match table with timed eviction of transient entries.

mod stale;
mod table;

pub use stale::{Clock, StaleList, DEFAULT_WAIT};
pub use table::{fnv32, ExactBuilder, ExactTable, DEFAULT_HASH_SIZE};
