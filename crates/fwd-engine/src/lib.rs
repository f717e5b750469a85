//! Forwarding-table engine.
//!
//! Packets are matched against tables of three algorithm families and the
//! resulting actions are applied by the [`Pipeline`]:
//!
//! ```text
//!                 +-------------------- lookup ---------------------+
//!                 v                                                 |
//! [packet] --> [Table::process] --> [Actions] --> transmit / drop / set_field
//!                                       |
//!                                     learn --> [Queue] --> consumer task
//!                                                              |
//!                                            (context write lock) add_entry
//! ```
//!
//! # Key Components
//!
//! - [`exact::ExactTable`]: hash table with transient-entry eviction
//! - [`prefix::PrefixTable`]: longest-prefix match over a compressed trie
//! - [`bridge::BridgeTable`]: destination-MAC table with asynchronous
//!   source learning
//! - [`TableRegistry`]: table type to builder mapping
//! - [`Engine`]: contexts, provisioning and packet injection
//!
//! All objects of a context share its reader/writer lock: packet
//! processing reads, provisioning and background tasks write.

pub mod actions;
pub mod bridge;
pub mod config;
pub mod counters;
pub mod engine;
pub mod error;
pub mod exact;
pub mod pipeline;
pub mod port;
pub mod prefix;
pub mod table;

pub use actions::{Action, ActionDesc, Actions, ProcessingState};
pub use config::Scenario;
pub use counters::{CounterSnapshot, Counters};
pub use engine::Engine;
pub use error::{EngineError, EngineResult, Result, TableError};
pub use pipeline::{Pipeline, Verdict};
pub use port::Port;
pub use table::{
    find_table, find_table_mut, EntryDesc, Table, TableDesc, TableRegistry, TableType,
};
