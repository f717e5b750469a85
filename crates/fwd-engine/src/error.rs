//! Error types for table and engine operations.
//!
//! Configuration and not-found errors are returned synchronously to the
//! provisioning caller and leave table state unchanged. Packet processing
//! never returns errors; best-effort failures there are logged and counted.

use fwd_common::{QueueError, RegistryError};
use fwd_types::{FieldId, ParseError};
use thiserror::Error;

/// Errors raised by tables and the table registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// No builder is registered for the requested table type.
    #[error("no builder registered for table type {0}")]
    NoBuilder(String),

    /// The field is not known to the packet-field registry.
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// The field is not one of the table's key fields.
    #[error("field {0} is not part of the table key")]
    FieldNotInKey(FieldId),

    #[error("duplicate field {0} in entry")]
    DuplicateField(FieldId),

    #[error("entry is missing key field {0}")]
    MissingField(FieldId),

    #[error("value for field {field} is {len} bytes, max is {max}")]
    FieldTooLong { field: FieldId, len: usize, max: usize },

    /// A packet lacks a field an action needs.
    #[error("packet has no usable {0}")]
    PacketField(FieldId),

    #[error("invalid mask on field {field}: {reason}")]
    InvalidMask { field: FieldId, reason: String },

    #[error("table {table} does not support {what}")]
    UnsupportedEntry { table: String, what: String },

    #[error("table configuration invalid: {0}")]
    InvalidConfig(String),

    #[error("entry not found in table {table}: {key}")]
    EntryNotFound { table: String, key: String },

    /// A transient entry may not override a static one with other actions.
    #[error("cannot override static entry {key} in table {table} with a transient entry")]
    StaticConflict { table: String, key: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl From<ParseError> for TableError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::UnknownField(name) => TableError::UnknownField(name),
            other => TableError::InvalidConfig(other.to_string()),
        }
    }
}

/// Result type for table operations.
pub type Result<T> = std::result::Result<T, TableError>;

/// Errors raised by the [`crate::Engine`] and its config loader.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("context not found: {0}")]
    ContextNotFound(String),

    #[error("context already exists: {0}")]
    ContextExists(String),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("invalid value: {0}")]
    Parse(#[from] ParseError),

    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
