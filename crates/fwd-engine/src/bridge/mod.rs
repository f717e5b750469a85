//! L2 learning bridge built on the exact-match table.

mod learn;
mod table;

pub use learn::{learn_action, LearnRequest};
pub use table::{BridgeBuilder, BridgeTable, DEFAULT_LEARN_TIMEOUT};
