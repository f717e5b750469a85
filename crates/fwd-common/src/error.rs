//! Error types shared by the dataplane plumbing.

use thiserror::Error;

/// Errors raised by [`crate::Queue`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue was closed; no further writes are accepted.
    #[error("queue {0} is closed")]
    Closed(String),

    /// A bounded queue is at capacity.
    #[error("queue {name} is full (max {max})")]
    Full { name: String, max: usize },

    /// `run()` was called more than once.
    #[error("queue {0} is already running")]
    AlreadyRunning(String),

    /// `run()` was called outside of a tokio runtime.
    #[error("queue {0} cannot start: no async runtime")]
    NoRuntime(String),
}

/// Errors raised by [`crate::ObjectRegistry`] and [`crate::Context`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object already exists: {0}")]
    AlreadyExists(String),

    #[error("object id is missing")]
    MissingId,

    #[error("numeric id {nid} already used by {owner}")]
    NidInUse { nid: u64, owner: String },

    #[error("object {id} is still referenced ({refs} handles)")]
    InUse { id: String, refs: usize },

    #[error("object {id} is not a {expected}")]
    TypeMismatch { id: String, expected: &'static str },

    #[error("context {0} is being destroyed")]
    Destroyed(String),

    #[error("context {0} cannot spawn tasks: no async runtime")]
    NoRuntime(String),
}

impl RegistryError {
    /// Returns true for errors that mean "the thing is not there".
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound(_))
    }
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
