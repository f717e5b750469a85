//! Longest-prefix-match table over a path-compressed binary trie.

pub mod bits;
mod table;
mod trie;

pub use table::{PrefixBuilder, PrefixTable};
pub use trie::PrefixTrie;
