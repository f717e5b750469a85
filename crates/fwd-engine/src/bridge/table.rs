use super::learn::{consume, LearnRequest};
use crate::actions::{Actions, ProcessingState};
use crate::counters::Counters;
use crate::error::{Result, TableError};
use crate::exact::ExactTable;
use crate::table::{
    BuildContext, EntryDesc, Table, TableBuilder, TableDesc, TableObject, TableType,
};
use fwd_common::Queue;
use fwd_types::{FieldId, FieldValue, MacAddress, Packet};
use log::debug;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Lifetime of learned entries when the descriptor does not set one.
pub const DEFAULT_LEARN_TIMEOUT: Duration = Duration::from_secs(300);

/// L2 table matching destination MACs and learning source MACs.
///
/// Storage is an [`ExactTable`] keyed on the destination MAC. Learning is
/// split in two: [`BridgeTable::learn`] runs on the packet path under the
/// context read lock and only enqueues, the consumer task installs entries
/// later under the write lock.
pub struct BridgeTable {
    exact: ExactTable,
    queue: Arc<Queue<LearnRequest>>,
}

impl BridgeTable {
    pub fn from_desc(ctx: &BuildContext<'_>, desc: &TableDesc) -> Result<Self> {
        if !desc.fields.is_empty() && desc.fields != [FieldId::ETH_DST] {
            return Err(TableError::InvalidConfig(format!(
                "bridge table {} must key on the destination MAC only",
                desc.id
            )));
        }
        let inner = TableDesc {
            fields: vec![FieldId::ETH_DST],
            transient_timeout: Some(desc.transient_timeout.unwrap_or(DEFAULT_LEARN_TIMEOUT)),
            ..desc.clone()
        };
        let exact = ExactTable::from_desc(ctx, &inner)?.with_type(TableType::Bridge);
        let queue = Arc::new(Queue::unbounded(format!("learn-{}", desc.id)));

        if let Some(context) = ctx.context {
            queue.run(context.tasks())?;
            let task = consume(
                Arc::downgrade(context),
                desc.id.clone(),
                Arc::clone(&queue),
            );
            if let Err(err) = context.spawn(&format!("learn consumer for {}", desc.id), task) {
                queue.close();
                return Err(err.into());
            }
        }
        Ok(Self { exact, queue })
    }

    /// Queue feeding the learn consumer.
    pub fn queue(&self) -> &Queue<LearnRequest> {
        &self.queue
    }

    pub fn exact(&self) -> &ExactTable {
        &self.exact
    }

    /// Requests learning of the packet's source MAC on its input port.
    ///
    /// Returns `Ok(false)` when nothing needs learning: the source is a
    /// group address or already has an entry. The request copies the MAC
    /// and port id out of the packet.
    pub fn learn(&self, packet: &dyn Packet) -> Result<bool> {
        let mac = packet
            .field(FieldId::ETH_SRC)
            .and_then(MacAddress::from_slice)
            .ok_or(TableError::PacketField(FieldId::ETH_SRC))?;
        if mac.is_multicast() {
            return Ok(false);
        }
        let key = self
            .exact
            .layout()
            .entry_key(&[FieldValue::new(FieldId::ETH_DST, mac.as_bytes().to_vec())])?;
        if self.exact.contains_key(&key) {
            return Ok(false);
        }
        let port_nid = packet
            .field_u64(FieldId::INPUT_PORT)
            .ok_or(TableError::PacketField(FieldId::INPUT_PORT))?;

        self.queue.write(LearnRequest { mac, port_nid })?;
        debug!(
            "bridge {}: queued learn of {} on port {}",
            self.exact.id(),
            mac,
            port_nid
        );
        Ok(true)
    }
}

impl Table for BridgeTable {
    fn id(&self) -> &str {
        self.exact.id()
    }

    fn table_type(&self) -> TableType {
        TableType::Bridge
    }

    fn add_entry(&mut self, entry: &EntryDesc, actions: Actions) -> Result<()> {
        self.exact.add_entry(entry, actions)
    }

    fn remove_entry(&mut self, entry: &EntryDesc) -> Result<()> {
        self.exact.remove_entry(entry)
    }

    fn clear(&mut self) {
        self.exact.clear();
    }

    fn entries(&self) -> Vec<String> {
        self.exact.entries()
    }

    fn entry_count(&self) -> usize {
        self.exact.entry_count()
    }

    fn process(&self, packet: &dyn Packet, counters: &Counters) -> (&Actions, ProcessingState) {
        self.exact.process(packet, counters)
    }

    fn cleanup(&mut self) {
        // The consumer exits once the closed queue drains.
        self.queue.close();
        self.exact.cleanup();
    }

    fn exact_mut(&mut self) -> Option<&mut ExactTable> {
        Some(&mut self.exact)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Builds [`BridgeTable`]s.
pub struct BridgeBuilder;

impl TableBuilder for BridgeBuilder {
    fn build(&self, ctx: &BuildContext<'_>, desc: &TableDesc) -> Result<TableObject> {
        Ok(TableObject::new(Box::new(BridgeTable::from_desc(ctx, desc)?)))
    }
}
