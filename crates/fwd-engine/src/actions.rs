//! Actions attached to table entries and table defaults.
//!
//! An [`ActionDesc`] names other objects by id. Building it into an
//! [`Action`] acquires a handle on every referenced object, so a port or
//! table cannot be removed while an entry still points at it. Dropping the
//! [`Actions`] releases those handles.

use crate::error::Result;
use crate::port::Port;
use crate::table::{acquire_table, find_table, TableType};
use fwd_common::{ObjectHandle, ObjectRegistry, RegistryError};
use fwd_types::FieldId;
use std::fmt;

use crate::table::key::hex;

/// Outcome of table processing for the current packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingState {
    /// Keep applying actions.
    Continue,
    /// Stop; the packet is dropped.
    Drop,
}

/// Provisioning-side description of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionDesc {
    Drop,
    Transmit { port: String },
    Lookup { table: String },
    /// Learn the packet's source MAC into a bridge table.
    BridgeLearn { table: Option<String> },
    SetField { field: FieldId, value: Vec<u8> },
}

impl ActionDesc {
    pub fn transmit(port: impl Into<String>) -> Self {
        ActionDesc::Transmit { port: port.into() }
    }

    pub fn lookup(table: impl Into<String>) -> Self {
        ActionDesc::Lookup {
            table: table.into(),
        }
    }

    pub fn learn(table: impl Into<String>) -> Self {
        ActionDesc::BridgeLearn {
            table: Some(table.into()),
        }
    }
}

/// A resolved action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Drop,
    Transmit { port: ObjectHandle },
    Lookup { table: ObjectHandle },
    BridgeLearn { table: Option<ObjectHandle> },
    SetField { field: FieldId, value: Vec<u8> },
}

impl Action {
    /// Resolves a description against the context's objects.
    pub fn build(objects: &ObjectRegistry, desc: &ActionDesc) -> Result<Self> {
        let action = match desc {
            ActionDesc::Drop => Action::Drop,
            ActionDesc::Transmit { port } => {
                objects.get_as::<Port>(port).map_err(|err| match err {
                    RegistryError::TypeMismatch { id, .. } => RegistryError::TypeMismatch {
                        id,
                        expected: "port",
                    },
                    other => other,
                })?;
                Action::Transmit {
                    port: objects.acquire(port)?,
                }
            }
            ActionDesc::Lookup { table } => Action::Lookup {
                table: acquire_table(objects, table)?,
            },
            ActionDesc::BridgeLearn { table: None } => Action::BridgeLearn { table: None },
            ActionDesc::BridgeLearn { table: Some(table) } => {
                let handle = acquire_table(objects, table)?;
                if find_table(objects, table)?.table_type() != TableType::Bridge {
                    return Err(RegistryError::TypeMismatch {
                        id: table.clone(),
                        expected: "bridge table",
                    }
                    .into());
                }
                Action::BridgeLearn {
                    table: Some(handle),
                }
            }
            ActionDesc::SetField { field, value } => Action::SetField {
                field: *field,
                value: value.clone(),
            },
        };
        Ok(action)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Drop => f.write_str("drop"),
            Action::Transmit { port } => write!(f, "transmit({})", port),
            Action::Lookup { table } => write!(f, "lookup({})", table),
            Action::BridgeLearn { table: Some(table) } => write!(f, "learn({})", table),
            Action::BridgeLearn { table: None } => f.write_str("learn(<none>)"),
            Action::SetField { field, value } => write!(f, "set({}={})", field, hex(value)),
        }
    }
}

/// Ordered list of actions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Actions(Vec<Action>);

impl Actions {
    /// No actions: processing simply continues.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(actions: Vec<Action>) -> Self {
        Self(actions)
    }

    /// Builds actions from descriptions, acquiring every referenced object.
    ///
    /// On error, handles acquired so far are released.
    pub fn build(objects: &ObjectRegistry, descs: &[ActionDesc]) -> Result<Self> {
        descs
            .iter()
            .map(|desc| Action::build(objects, desc))
            .collect::<Result<Vec<_>>>()
            .map(Actions)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Actions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, action) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", action)?;
        }
        f.write_str("]")
    }
}

impl From<Vec<Action>> for Actions {
    fn from(actions: Vec<Action>) -> Self {
        Actions(actions)
    }
}
