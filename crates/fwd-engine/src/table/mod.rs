//! The `Table` abstraction shared by all match algorithms.
//!
//! Tables are registry objects. Provisioning calls (`add_entry`,
//! `remove_entry`, `clear`) take `&mut self` and are only reachable through
//! the context write lock; `process` takes `&self` and runs under the read
//! lock, so a lookup can never observe a half-built entry.

pub mod key;
mod registry;

pub use registry::{BuildContext, TableBuilder, TableRegistry};

use crate::actions::{ActionDesc, Actions, ProcessingState};
use crate::counters::Counters;
use crate::error::Result;
use crate::exact::ExactTable;
use fwd_common::{Object, ObjectHandle, ObjectRegistry, RegistryError, RegistryResult};
use fwd_types::{FieldId, FieldValue, Packet};
use std::any::Any;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Table algorithm family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableType {
    Exact,
    Prefix,
    Bridge,
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TableType::Exact => "exact",
            TableType::Prefix => "prefix",
            TableType::Bridge => "bridge",
        };
        f.write_str(s)
    }
}

impl FromStr for TableType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(TableType::Exact),
            "prefix" | "lpm" => Ok(TableType::Prefix),
            "bridge" => Ok(TableType::Bridge),
            _ => Err(format!("unknown table type: {}", s)),
        }
    }
}

/// Table creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDesc {
    pub id: String,
    pub table_type: TableType,
    /// Key fields, in key order.
    pub fields: Vec<FieldId>,
    /// Actions returned when no entry matches.
    pub default_actions: Vec<ActionDesc>,
    /// Lifetime of unused transient entries; `None` disables eviction.
    pub transient_timeout: Option<Duration>,
    /// Number of hash buckets for exact-match storage.
    pub hash_size: Option<usize>,
}

impl TableDesc {
    pub fn new(id: impl Into<String>, table_type: TableType, fields: Vec<FieldId>) -> Self {
        Self {
            id: id.into(),
            table_type,
            fields,
            default_actions: Vec::new(),
            transient_timeout: None,
            hash_size: None,
        }
    }

    pub fn exact(id: impl Into<String>, fields: Vec<FieldId>) -> Self {
        Self::new(id, TableType::Exact, fields)
    }

    pub fn prefix(id: impl Into<String>, fields: Vec<FieldId>) -> Self {
        Self::new(id, TableType::Prefix, fields)
    }

    /// Bridge tables always key on the destination MAC.
    pub fn bridge(id: impl Into<String>) -> Self {
        Self::new(id, TableType::Bridge, vec![FieldId::ETH_DST])
    }

    pub fn with_default(mut self, actions: Vec<ActionDesc>) -> Self {
        self.default_actions = actions;
        self
    }

    pub fn with_transient_timeout(mut self, timeout: Duration) -> Self {
        self.transient_timeout = Some(timeout);
        self
    }

    pub fn with_hash_size(mut self, size: usize) -> Self {
        self.hash_size = Some(size);
        self
    }
}

/// Entry add/remove request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryDesc {
    pub fields: Vec<FieldValue>,
    /// Transient entries are evicted after the table's timeout of disuse.
    pub transient: bool,
}

impl EntryDesc {
    pub fn new(fields: Vec<FieldValue>) -> Self {
        Self {
            fields,
            transient: false,
        }
    }

    pub fn transient(fields: Vec<FieldValue>) -> Self {
        Self {
            fields,
            transient: true,
        }
    }
}

/// A forwarding table.
pub trait Table: Send + Sync + 'static {
    fn id(&self) -> &str;

    fn table_type(&self) -> TableType;

    /// Adds or replaces an entry.
    fn add_entry(&mut self, entry: &EntryDesc, actions: Actions) -> Result<()>;

    /// Removes an entry; fails if it does not exist.
    fn remove_entry(&mut self, entry: &EntryDesc) -> Result<()>;

    /// Removes every entry, releasing their actions.
    fn clear(&mut self);

    /// Human-readable rendering of every entry.
    fn entries(&self) -> Vec<String>;

    fn entry_count(&self) -> usize;

    /// Looks up a packet. Runs under the context read lock.
    fn process(&self, packet: &dyn Packet, counters: &Counters) -> (&Actions, ProcessingState);

    /// Releases all entries and default actions and stops background work.
    /// Must be idempotent.
    fn cleanup(&mut self);

    /// Exact-match storage backing this table, if any.
    fn exact_mut(&mut self) -> Option<&mut ExactTable> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// Registry wrapper that lets any [`Table`] live in an [`ObjectRegistry`].
pub struct TableObject {
    table: Box<dyn Table>,
}

impl TableObject {
    pub fn new(table: Box<dyn Table>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &dyn Table {
        self.table.as_ref()
    }

    pub fn table_mut(&mut self) -> &mut dyn Table {
        self.table.as_mut()
    }
}

impl Object for TableObject {
    fn id(&self) -> &str {
        self.table.id()
    }

    fn kind(&self) -> &'static str {
        "table"
    }

    fn cleanup(&mut self) {
        self.table.cleanup();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn not_a_table(id: &str) -> RegistryError {
    RegistryError::TypeMismatch {
        id: id.to_string(),
        expected: "table",
    }
}

/// Read-only lookup of a table by id.
pub fn find_table<'a>(objects: &'a ObjectRegistry, id: &str) -> RegistryResult<&'a dyn Table> {
    objects
        .get(id)?
        .as_any()
        .downcast_ref::<TableObject>()
        .map(TableObject::table)
        .ok_or_else(|| not_a_table(id))
}

/// Mutable lookup of a table by id (write lock held).
pub fn find_table_mut<'a>(
    objects: &'a mut ObjectRegistry,
    id: &str,
) -> RegistryResult<&'a mut dyn Table> {
    objects
        .get_mut(id)?
        .as_any_mut()
        .downcast_mut::<TableObject>()
        .map(TableObject::table_mut)
        .ok_or_else(|| not_a_table(id))
}

/// Takes a counted reference to a table.
///
/// If the object exists but is not a table, the reference taken for the
/// type check is released before the error is returned.
pub fn acquire_table(objects: &ObjectRegistry, id: &str) -> RegistryResult<ObjectHandle> {
    let handle = objects.acquire(id)?;
    find_table(objects, id)?;
    Ok(handle)
}
