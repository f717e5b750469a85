use super::bits::{BitSlice, Bits};
use super::trie::PrefixTrie;
use crate::actions::{Actions, ProcessingState};
use crate::counters::Counters;
use crate::error::{Result, TableError};
use crate::table::key::{write_slot, KeyLayout};
use crate::table::{
    BuildContext, EntryDesc, Table, TableBuilder, TableDesc, TableObject, TableType,
};
use fwd_types::{FieldId, FieldValue, Packet};
use log::debug;
use std::any::Any;

/// Longest-prefix-match table.
///
/// The key is the concatenation of all field slots. Only the last field may
/// carry a partial mask; every earlier field matches in full.
pub struct PrefixTable {
    id: String,
    layout: KeyLayout,
    default_actions: Actions,
    trie: PrefixTrie<Actions>,
}

impl PrefixTable {
    pub fn new(id: impl Into<String>, layout: KeyLayout, default_actions: Actions) -> Self {
        Self {
            id: id.into(),
            layout,
            default_actions,
            trie: PrefixTrie::new(),
        }
    }

    pub fn from_desc(ctx: &BuildContext<'_>, desc: &TableDesc) -> Result<Self> {
        if desc.transient_timeout.is_some_and(|t| !t.is_zero()) {
            return Err(TableError::InvalidConfig(format!(
                "prefix table {} cannot have a transient timeout",
                desc.id
            )));
        }
        let layout = KeyLayout::new(ctx.fields, &desc.fields)?;
        let default_actions = Actions::build(ctx.objects, &desc.default_actions)?;
        Ok(Self::new(desc.id.clone(), layout, default_actions))
    }

    /// Packs entry values into key bytes and the number of significant bits.
    fn entry_key(&self, values: &[FieldValue]) -> Result<Bits> {
        let ordered = self.layout.order(values)?;
        let mut key = vec![0u8; self.layout.len()];
        let mut bit_len = 0;
        let last = ordered.len() - 1;
        for (i, (value, slot)) in ordered.iter().zip(self.layout.slots()).enumerate() {
            write_slot(&mut key[slot.offset..slot.offset + slot.size], &value.bytes);
            let prefix_len = mask_prefix_len(value.field, value.mask.as_deref(), slot.size)?;
            if i < last && prefix_len != slot.size * 8 {
                return Err(TableError::InvalidMask {
                    field: value.field,
                    reason: "only the last key field may be masked".into(),
                });
            }
            bit_len = slot.offset * 8 + prefix_len;
        }
        Ok(Bits::from_bytes(&key, bit_len))
    }
}

/// Length of a contiguous mask, right-aligned in a slot of `size` bytes.
///
/// Bytes missing on the left of a short mask count as all ones.
fn mask_prefix_len(field: FieldId, mask: Option<&[u8]>, size: usize) -> Result<usize> {
    let Some(mask) = mask else {
        return Ok(size * 8);
    };
    let mut full = vec![0xffu8; size];
    write_slot(&mut full, mask);
    let bits = BitSlice::new(&full, size * 8);
    let ones = (0..bits.len()).take_while(|&i| bits.bit(i)).count();
    if (ones..bits.len()).any(|i| bits.bit(i)) {
        return Err(TableError::InvalidMask {
            field,
            reason: "mask is not contiguous".into(),
        });
    }
    Ok(ones)
}

impl Table for PrefixTable {
    fn id(&self) -> &str {
        &self.id
    }

    fn table_type(&self) -> TableType {
        TableType::Prefix
    }

    fn add_entry(&mut self, entry: &EntryDesc, actions: Actions) -> Result<()> {
        if entry.transient {
            return Err(TableError::UnsupportedEntry {
                table: self.id.clone(),
                what: "transient entries".into(),
            });
        }
        let key = self.entry_key(&entry.fields)?;
        debug!("table {}: add {} -> {}", self.id, key, actions);
        self.trie.insert(key.as_slice(), actions);
        Ok(())
    }

    fn remove_entry(&mut self, entry: &EntryDesc) -> Result<()> {
        let key = self.entry_key(&entry.fields)?;
        match self.trie.remove(key.as_slice()) {
            Some(_) => {
                debug!("table {}: removed {}", self.id, key);
                Ok(())
            }
            None => Err(TableError::EntryNotFound {
                table: self.id.clone(),
                key: key.to_string(),
            }),
        }
    }

    fn clear(&mut self) {
        self.trie.clear();
    }

    fn entries(&self) -> Vec<String> {
        self.trie
            .entries()
            .into_iter()
            .map(|(prefix, actions)| format!("{} -> {}", prefix, actions))
            .collect()
    }

    fn entry_count(&self) -> usize {
        self.trie.len()
    }

    fn process(&self, packet: &dyn Packet, counters: &Counters) -> (&Actions, ProcessingState) {
        let key = self.layout.packet_key(packet);
        match self.trie.longest_match(BitSlice::new(&key, key.len() * 8)) {
            Some((_, actions)) => {
                Counters::inc(&counters.table_hits);
                (actions, ProcessingState::Continue)
            }
            None => {
                Counters::inc(&counters.table_misses);
                (&self.default_actions, ProcessingState::Continue)
            }
        }
    }

    fn cleanup(&mut self) {
        self.trie.clear();
        self.default_actions = Actions::none();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Builds [`PrefixTable`]s.
pub struct PrefixBuilder;

impl TableBuilder for PrefixBuilder {
    fn build(&self, ctx: &BuildContext<'_>, desc: &TableDesc) -> Result<TableObject> {
        Ok(TableObject::new(Box::new(PrefixTable::from_desc(ctx, desc)?)))
    }
}
