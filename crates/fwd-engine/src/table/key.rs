//! Fixed-width key layout shared by the match tables.
//!
//! A key is the concatenation of one slot per configured field, in table
//! order. Each slot is `max_size` bytes wide; shorter values are placed
//! right-aligned with zero fill on the left.

use crate::error::{Result, TableError};
use fwd_types::{FieldId, FieldRegistry, FieldValue, Packet};
use std::collections::HashSet;
use std::fmt::Write;

/// One field slot of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub field: FieldId,
    pub name: String,
    pub offset: usize,
    pub size: usize,
}

/// Ordered slots making up a table key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    slots: Vec<Slot>,
    len: usize,
}

impl KeyLayout {
    /// Builds the layout for the given key fields.
    pub fn new(fields: &FieldRegistry, ids: &[FieldId]) -> Result<Self> {
        if ids.is_empty() {
            return Err(TableError::InvalidConfig("table has no key fields".into()));
        }
        let mut seen = HashSet::new();
        let mut slots = Vec::with_capacity(ids.len());
        let mut offset = 0;
        for &field in ids {
            if !seen.insert(field) {
                return Err(TableError::DuplicateField(field));
            }
            let size = fields.max_size(field)?;
            slots.push(Slot {
                field,
                name: fields.name(field),
                offset,
                size,
            });
            offset += size;
        }
        Ok(Self { slots, len: offset })
    }

    /// Total key length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Orders entry values by slot, validating them.
    ///
    /// Every slot needs exactly one value, values must belong to the key and
    /// fit their slot.
    pub fn order<'v>(&self, values: &'v [FieldValue]) -> Result<Vec<&'v FieldValue>> {
        let mut ordered: Vec<Option<&FieldValue>> = vec![None; self.slots.len()];
        for value in values {
            let index = self
                .slots
                .iter()
                .position(|slot| slot.field == value.field)
                .ok_or(TableError::FieldNotInKey(value.field))?;
            if ordered[index].is_some() {
                return Err(TableError::DuplicateField(value.field));
            }
            let size = self.slots[index].size;
            if value.bytes.len() > size {
                return Err(TableError::FieldTooLong {
                    field: value.field,
                    len: value.bytes.len(),
                    max: size,
                });
            }
            if let Some(mask) = &value.mask {
                if mask.len() > size {
                    return Err(TableError::FieldTooLong {
                        field: value.field,
                        len: mask.len(),
                        max: size,
                    });
                }
            }
            ordered[index] = Some(value);
        }

        ordered
            .into_iter()
            .zip(&self.slots)
            .map(|(value, slot)| value.ok_or(TableError::MissingField(slot.field)))
            .collect()
    }

    /// Packs validated entry values into key bytes.
    pub fn entry_key(&self, values: &[FieldValue]) -> Result<Vec<u8>> {
        let ordered = self.order(values)?;
        let mut key = vec![0u8; self.len];
        for (value, slot) in ordered.iter().zip(&self.slots) {
            write_slot(&mut key[slot.offset..slot.offset + slot.size], &value.bytes);
        }
        Ok(key)
    }

    /// Builds the key of a packet. Missing fields read as zero.
    pub fn packet_key(&self, packet: &dyn Packet) -> Vec<u8> {
        let mut key = vec![0u8; self.len];
        for slot in &self.slots {
            if let Some(bytes) = packet.field(slot.field) {
                // Oversized packet values keep their low-order bytes.
                let bytes = &bytes[bytes.len().saturating_sub(slot.size)..];
                write_slot(&mut key[slot.offset..slot.offset + slot.size], bytes);
            }
        }
        key
    }

    /// Renders a key as `name=hex` pairs.
    pub fn describe(&self, key: &[u8]) -> String {
        let mut out = String::new();
        for (i, slot) in self.slots.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            let end = (slot.offset + slot.size).min(key.len());
            let start = slot.offset.min(end);
            let _ = write!(out, "{}={}", slot.name, hex(&key[start..end]));
        }
        out
    }
}

/// Copies `value` right-aligned into `slot`; the caller zeroes the slot.
pub fn write_slot(slot: &mut [u8], value: &[u8]) {
    let start = slot.len() - value.len();
    slot[start..].copy_from_slice(value);
}

/// Lower-case hex rendering of a byte string.
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02x}", b);
    }
    out
}
