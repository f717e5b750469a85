//! Hash table storage for exact matches.
//!
//! Entries live in a slab. Each bucket holds the index of the first entry
//! of its collision chain; chains are doubly linked through the entries so
//! unlinking is O(1). New entries go to the head of their chain.
//!
//! Transient entries additionally sit on a [`StaleList`] guarded by a
//! private mutex. `process` runs under the context read lock and only
//! touches that mutex; the stale monitor takes the context write lock
//! first and then works through `&mut self`, so the lock order is always
//! context lock, then stale mutex.

use super::stale::{Clock, StaleList, DEFAULT_WAIT};
use crate::actions::{Actions, ProcessingState};
use crate::counters::Counters;
use crate::error::{Result, TableError};
use crate::table::key::KeyLayout;
use crate::table::{
    find_table_mut, BuildContext, EntryDesc, Table, TableBuilder, TableDesc, TableObject,
    TableType,
};
use fwd_common::Context;
use fwd_types::Packet;
use log::debug;
use parking_lot::Mutex;
use slab::Slab;
use std::any::Any;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::{CancellationToken, DropGuard};

/// Default number of hash buckets.
pub const DEFAULT_HASH_SIZE: usize = 1024;

const FNV_OFFSET: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// 32-bit FNV-1 hash.
pub fn fnv32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        hash.wrapping_mul(FNV_PRIME) ^ u32::from(*b)
    })
}

struct Entry {
    key: Vec<u8>,
    actions: Actions,
    bucket: usize,
    hash_prev: Option<usize>,
    hash_next: Option<usize>,
    /// Node on the stale list; set iff the entry is transient.
    stale: Option<usize>,
}

/// Exact-match table keyed on fixed-width field bytes.
pub struct ExactTable {
    id: String,
    table_type: TableType,
    layout: KeyLayout,
    default_actions: Actions,
    entries: Slab<Entry>,
    buckets: Vec<Option<usize>>,
    stale: Mutex<StaleList>,
    monitor: Option<DropGuard>,
}

impl ExactTable {
    /// Creates an empty table.
    ///
    /// `hash_size` must be a non-zero power of two. A zero `timeout` keeps
    /// transient entries forever.
    pub fn new(
        id: impl Into<String>,
        layout: KeyLayout,
        default_actions: Actions,
        hash_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        if hash_size == 0 || !hash_size.is_power_of_two() {
            return Err(TableError::InvalidConfig(format!(
                "hash size {} is not a power of two",
                hash_size
            )));
        }
        Ok(Self {
            id: id.into(),
            table_type: TableType::Exact,
            layout,
            default_actions,
            entries: Slab::new(),
            buckets: vec![None; hash_size],
            stale: Mutex::new(StaleList::new(timeout)),
            monitor: None,
        })
    }

    /// Builds a table from a descriptor, starting the stale monitor when
    /// the table has a timeout and lives in a context.
    pub fn from_desc(ctx: &BuildContext<'_>, desc: &TableDesc) -> Result<Self> {
        let layout = KeyLayout::new(ctx.fields, &desc.fields)?;
        let default_actions = Actions::build(ctx.objects, &desc.default_actions)?;
        let mut table = Self::new(
            desc.id.clone(),
            layout,
            default_actions,
            desc.hash_size.unwrap_or(DEFAULT_HASH_SIZE),
            desc.transient_timeout.unwrap_or_default(),
        )?;
        if let Some(context) = ctx.context {
            if !table.timeout().is_zero() {
                table.start_monitor(context)?;
            }
        }
        Ok(table)
    }

    /// Reports a different table type; used when another table wraps this
    /// storage.
    pub(crate) fn with_type(mut self, table_type: TableType) -> Self {
        self.table_type = table_type;
        self
    }

    pub fn layout(&self) -> &KeyLayout {
        &self.layout
    }

    pub fn timeout(&self) -> Duration {
        self.stale.lock().timeout()
    }

    pub fn hash_size(&self) -> usize {
        self.buckets.len()
    }

    /// Replaces the clock used for stale deadlines.
    pub fn set_clock(&mut self, clock: Clock) {
        self.stale.get_mut().set_clock(clock);
    }

    /// Number of transient entries.
    pub fn transient_count(&self) -> usize {
        self.stale.lock().len()
    }

    /// Returns true if an entry with exactly this key exists.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.find(key).is_some()
    }

    /// Evicts every transient entry past its deadline and returns how long
    /// to wait before the next deadline.
    pub fn expire_stale(&mut self) -> Duration {
        let stale = self.stale.get_mut();
        if stale.timeout().is_zero() {
            return DEFAULT_WAIT;
        }
        let (expired, wait) = stale.expire();
        for &index in &expired {
            if let Some(entry) = self.entries.get_mut(index) {
                entry.stale = None;
            }
            self.unlink(index);
        }
        if !expired.is_empty() {
            debug!("table {}: evicted {} stale entries", self.id, expired.len());
        }
        wait
    }

    fn start_monitor(&mut self, context: &Arc<Context>) -> Result<()> {
        let token = CancellationToken::new();
        let wake = self.stale.get_mut().wake();
        let task = monitor(
            Arc::downgrade(context),
            self.id.clone(),
            wake,
            token.clone(),
        );
        context.spawn(&format!("stale monitor for {}", self.id), task)?;
        self.monitor = Some(token.drop_guard());
        Ok(())
    }

    fn bucket_of(&self, key: &[u8]) -> usize {
        fnv32(key) as usize & (self.buckets.len() - 1)
    }

    fn find(&self, key: &[u8]) -> Option<usize> {
        let mut cursor = self.buckets[self.bucket_of(key)];
        while let Some(index) = cursor {
            let entry = &self.entries[index];
            if entry.key == key {
                return Some(index);
            }
            cursor = entry.hash_next;
        }
        None
    }

    fn insert(&mut self, key: Vec<u8>, actions: Actions, transient: bool) {
        let bucket = self.bucket_of(&key);
        let head = self.buckets[bucket];
        let index = self.entries.insert(Entry {
            key,
            actions,
            bucket,
            hash_prev: None,
            hash_next: head,
            stale: None,
        });
        if let Some(head) = head {
            self.entries[head].hash_prev = Some(index);
        }
        self.buckets[bucket] = Some(index);
        if transient {
            let node = self.stale.get_mut().push(index);
            self.entries[index].stale = Some(node);
        }
    }

    /// Removes an entry from its chain and the stale list.
    fn unlink(&mut self, index: usize) -> Option<Entry> {
        let entry = self.entries.try_remove(index)?;
        match entry.hash_prev {
            Some(prev) => self.entries[prev].hash_next = entry.hash_next,
            None => self.buckets[entry.bucket] = entry.hash_next,
        }
        if let Some(next) = entry.hash_next {
            self.entries[next].hash_prev = entry.hash_prev;
        }
        if let Some(node) = entry.stale {
            self.stale.get_mut().remove(node);
        }
        Some(entry)
    }
}

impl Table for ExactTable {
    fn id(&self) -> &str {
        &self.id
    }

    fn table_type(&self) -> TableType {
        self.table_type
    }

    fn add_entry(&mut self, entry: &EntryDesc, actions: Actions) -> Result<()> {
        let key = self.layout.entry_key(&entry.fields)?;
        let Some(index) = self.find(&key) else {
            debug!(
                "table {}: add {} -> {}",
                self.id,
                self.layout.describe(&key),
                actions
            );
            self.insert(key, actions, entry.transient);
            return Ok(());
        };

        let existing = &mut self.entries[index];
        if existing.stale.is_none() && entry.transient {
            if existing.actions == actions {
                return Ok(());
            }
            return Err(TableError::StaticConflict {
                table: self.id.clone(),
                key: self.layout.describe(&key),
            });
        }

        existing.actions = actions;
        let stale = existing.stale;
        match (stale, entry.transient) {
            (Some(node), true) => self.stale.get_mut().touch(node),
            (Some(node), false) => {
                self.stale.get_mut().remove(node);
                self.entries[index].stale = None;
            }
            (None, _) => {}
        }
        debug!(
            "table {}: replaced {} -> {}",
            self.id,
            self.layout.describe(&key),
            self.entries[index].actions
        );
        Ok(())
    }

    fn remove_entry(&mut self, entry: &EntryDesc) -> Result<()> {
        let key = self.layout.entry_key(&entry.fields)?;
        let index = self.find(&key).ok_or_else(|| TableError::EntryNotFound {
            table: self.id.clone(),
            key: self.layout.describe(&key),
        })?;
        self.unlink(index);
        debug!(
            "table {}: removed {}",
            self.id,
            self.layout.describe(&key)
        );
        Ok(())
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.buckets.iter_mut().for_each(|bucket| *bucket = None);
        self.stale.get_mut().clear();
    }

    fn entries(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(_, entry)| {
                let mut line = format!(
                    "{} -> {}",
                    self.layout.describe(&entry.key),
                    entry.actions
                );
                if entry.stale.is_some() {
                    line.push_str(" (transient)");
                }
                line
            })
            .collect()
    }

    fn entry_count(&self) -> usize {
        self.entries.len()
    }

    fn process(&self, packet: &dyn Packet, counters: &Counters) -> (&Actions, ProcessingState) {
        let key = self.layout.packet_key(packet);
        match self.find(&key) {
            Some(index) => {
                Counters::inc(&counters.table_hits);
                let entry = &self.entries[index];
                if let Some(node) = entry.stale {
                    self.stale.lock().touch(node);
                }
                (&entry.actions, ProcessingState::Continue)
            }
            None => {
                Counters::inc(&counters.table_misses);
                (&self.default_actions, ProcessingState::Continue)
            }
        }
    }

    fn cleanup(&mut self) {
        // Dropping the guard cancels the monitor.
        drop(self.monitor.take());
        self.clear();
        self.default_actions = Actions::none();
    }

    fn exact_mut(&mut self) -> Option<&mut ExactTable> {
        Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Periodically sweeps the stale list of one table.
///
/// The task finds its table by id under the context write lock on every
/// pass, so it never holds a reference into the registry across an await.
async fn monitor(
    context: Weak<Context>,
    table: String,
    wake: Arc<Notify>,
    token: CancellationToken,
) {
    let mut wait = DEFAULT_WAIT;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = wake.notified() => {}
            _ = tokio::time::sleep(wait) => {}
        }
        let Some(context) = context.upgrade() else {
            break;
        };
        let next = {
            let mut objects = context.write();
            if token.is_cancelled() {
                None
            } else {
                find_table_mut(&mut objects, &table)
                    .ok()
                    .and_then(|t| t.exact_mut())
                    .map(ExactTable::expire_stale)
            }
        };
        match next {
            Some(next) => wait = next,
            None => break,
        }
    }
    debug!("table {}: stale monitor stopped", table);
}

/// Builds [`ExactTable`]s.
pub struct ExactBuilder;

impl TableBuilder for ExactBuilder {
    fn build(&self, ctx: &BuildContext<'_>, desc: &TableDesc) -> Result<TableObject> {
        Ok(TableObject::new(Box::new(ExactTable::from_desc(ctx, desc)?)))
    }
}
