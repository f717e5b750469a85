//! Engine: owns the contexts and routes provisioning and packets to them.
//!
//! Every provisioning call takes the target context's write lock for its
//! whole duration. [`Engine::inject`] takes the read lock, so packets are
//! processed concurrently with each other and never with a mutation.

use crate::actions::{ActionDesc, Actions};
use crate::counters::{CounterSnapshot, Counters};
use crate::error::{EngineError, EngineResult};
use crate::pipeline::{Pipeline, Verdict};
use crate::port::Port;
use crate::table::{find_table, find_table_mut, EntryDesc, TableDesc, TableRegistry};
use fwd_common::{Context, ContextConfig};
use fwd_types::{FieldRegistry, Packet};
use log::info;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

struct ContextSlot {
    context: Arc<Context>,
    counters: Arc<Counters>,
}

/// Top-level handle on the dataplane.
pub struct Engine {
    tables: TableRegistry,
    pipeline: Pipeline,
    contexts: RwLock<HashMap<String, ContextSlot>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::standard()
    }
}

impl Engine {
    pub fn new(tables: TableRegistry) -> Self {
        Self {
            tables,
            pipeline: Pipeline::default(),
            contexts: RwLock::new(HashMap::new()),
        }
    }

    /// Engine with the standard fields and all built-in table types.
    pub fn standard() -> Self {
        Self::new(TableRegistry::standard())
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn fields(&self) -> &FieldRegistry {
        self.tables.fields()
    }

    pub fn tables(&self) -> &TableRegistry {
        &self.tables
    }

    pub fn create_context(
        &self,
        id: impl Into<String>,
        config: ContextConfig,
    ) -> EngineResult<Arc<Context>> {
        let id = id.into();
        let mut contexts = self.contexts.write();
        if contexts.contains_key(&id) {
            return Err(EngineError::ContextExists(id));
        }
        let context = Context::new(id.clone(), config);
        contexts.insert(
            id.clone(),
            ContextSlot {
                context: Arc::clone(&context),
                counters: Arc::new(Counters::new()),
            },
        );
        info!("created context {}", id);
        Ok(context)
    }

    /// Removes a context and waits until its objects and tasks are gone.
    ///
    /// Returns the number of objects that were cleaned up.
    pub async fn destroy_context(&self, id: &str) -> EngineResult<usize> {
        let slot = self
            .contexts
            .write()
            .remove(id)
            .ok_or_else(|| EngineError::ContextNotFound(id.to_string()))?;
        Ok(slot.context.destroy().await)
    }

    pub fn context(&self, id: &str) -> EngineResult<Arc<Context>> {
        self.slot(id).map(|(context, _)| context)
    }

    /// Ids of all live contexts, sorted.
    pub fn context_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.contexts.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn slot(&self, id: &str) -> EngineResult<(Arc<Context>, Arc<Counters>)> {
        self.contexts
            .read()
            .get(id)
            .map(|slot| (Arc::clone(&slot.context), Arc::clone(&slot.counters)))
            .ok_or_else(|| EngineError::ContextNotFound(id.to_string()))
    }

    pub fn create_port(&self, ctx: &str, port: Port) -> EngineResult<()> {
        let context = self.context(ctx)?;
        let name = port.to_string();
        context.write().insert(Box::new(port))?;
        info!("context {}: created port {}", ctx, name);
        Ok(())
    }

    pub fn create_table(&self, ctx: &str, desc: &TableDesc) -> EngineResult<()> {
        let context = self.context(ctx)?;
        let mut objects = context.write();
        self.tables.create(&context, &mut objects, desc)?;
        Ok(())
    }

    /// Removes a port or table. Fails while any entry still references it.
    pub fn remove_object(&self, ctx: &str, id: &str) -> EngineResult<()> {
        let context = self.context(ctx)?;
        let removed = context.write().remove(id)?;
        info!("context {}: removed {} {}", ctx, removed.kind(), id);
        Ok(())
    }

    pub fn add_entry(
        &self,
        ctx: &str,
        table: &str,
        entry: &EntryDesc,
        actions: &[ActionDesc],
    ) -> EngineResult<()> {
        let context = self.context(ctx)?;
        let mut objects = context.write();
        find_table(&objects, table)?;
        let actions = Actions::build(&objects, actions)?;
        find_table_mut(&mut objects, table)?.add_entry(entry, actions)?;
        Ok(())
    }

    pub fn remove_entry(&self, ctx: &str, table: &str, entry: &EntryDesc) -> EngineResult<()> {
        let context = self.context(ctx)?;
        let mut objects = context.write();
        find_table_mut(&mut objects, table)?.remove_entry(entry)?;
        Ok(())
    }

    pub fn clear_table(&self, ctx: &str, table: &str) -> EngineResult<()> {
        let context = self.context(ctx)?;
        let mut objects = context.write();
        find_table_mut(&mut objects, table)?.clear();
        info!("context {}: cleared table {}", ctx, table);
        Ok(())
    }

    pub fn entries(&self, ctx: &str, table: &str) -> EngineResult<Vec<String>> {
        let context = self.context(ctx)?;
        let objects = context.read();
        Ok(find_table(&objects, table)?.entries())
    }

    /// Runs one packet through the pipeline starting at `table`.
    pub fn inject(&self, ctx: &str, table: &str, packet: &mut dyn Packet) -> EngineResult<Verdict> {
        let (context, counters) = self.slot(ctx)?;
        let objects = context.read();
        Ok(self.pipeline.run(&objects, table, packet, &counters))
    }

    pub fn counters(&self, ctx: &str) -> EngineResult<CounterSnapshot> {
        self.slot(ctx).map(|(_, counters)| counters.snapshot())
    }

    /// Destroys every context.
    pub async fn shutdown(&self) {
        let slots: Vec<ContextSlot> = self
            .contexts
            .write()
            .drain()
            .map(|(_, slot)| slot)
            .collect();
        for slot in slots {
            slot.context.destroy().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TableError;
    use fwd_common::RegistryError;
    use fwd_types::{FieldId, FieldPacket, FieldValue};
    use pretty_assertions::assert_eq;

    fn engine_with_ports() -> Engine {
        let engine = Engine::standard();
        engine.create_context("ctx", ContextConfig::default()).unwrap();
        engine.create_port("ctx", Port::new("p1", 1)).unwrap();
        engine.create_port("ctx", Port::new("p2", 2)).unwrap();
        engine
    }

    fn vlan(id: u16) -> EntryDesc {
        EntryDesc::new(vec![FieldValue::new(FieldId::VLAN_ID, id.to_be_bytes())])
    }

    #[tokio::test]
    async fn test_context_lifecycle() {
        let engine = Engine::standard();
        engine.create_context("b", ContextConfig::default()).unwrap();
        engine.create_context("a", ContextConfig::default()).unwrap();
        assert!(matches!(
            engine.create_context("a", ContextConfig::default()),
            Err(EngineError::ContextExists(_))
        ));
        assert_eq!(engine.context_ids(), vec!["a", "b"]);

        engine.create_port("a", Port::new("p1", 1)).unwrap();
        assert_eq!(engine.destroy_context("a").await.unwrap(), 1);
        assert!(matches!(
            engine.destroy_context("a").await,
            Err(EngineError::ContextNotFound(_))
        ));
        engine.shutdown().await;
        assert!(engine.context_ids().is_empty());
    }

    #[tokio::test]
    async fn test_provision_and_inject() {
        let engine = engine_with_ports();
        engine
            .create_table(
                "ctx",
                &TableDesc::exact("vlans", vec![FieldId::VLAN_ID])
                    .with_default(vec![ActionDesc::Drop]),
            )
            .unwrap();
        engine
            .add_entry("ctx", "vlans", &vlan(10), &[ActionDesc::transmit("p2")])
            .unwrap();
        assert_eq!(
            engine.entries("ctx", "vlans").unwrap(),
            vec!["vlan_id=000a -> [transmit(p2)]"]
        );

        let mut hit = FieldPacket::new().with(FieldId::VLAN_ID, vec![0, 10]);
        assert_eq!(
            engine.inject("ctx", "vlans", &mut hit).unwrap(),
            Verdict::Forward(vec!["p2".into()])
        );
        let mut miss = FieldPacket::new().with(FieldId::VLAN_ID, vec![0, 11]);
        assert_eq!(engine.inject("ctx", "vlans", &mut miss).unwrap(), Verdict::Drop);

        let counters = engine.counters("ctx").unwrap();
        assert_eq!(counters.rx_packets, 2);
        assert_eq!(counters.tx_packets, 1);
        assert_eq!(counters.drops, 1);

        engine.remove_entry("ctx", "vlans", &vlan(10)).unwrap();
        assert!(engine.entries("ctx", "vlans").unwrap().is_empty());
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_referenced_objects_cannot_be_removed() {
        let engine = engine_with_ports();
        engine
            .create_table("ctx", &TableDesc::exact("vlans", vec![FieldId::VLAN_ID]))
            .unwrap();
        engine
            .add_entry("ctx", "vlans", &vlan(10), &[ActionDesc::transmit("p1")])
            .unwrap();

        assert!(matches!(
            engine.remove_object("ctx", "p1"),
            Err(EngineError::Registry(RegistryError::InUse { .. }))
        ));
        engine.clear_table("ctx", "vlans").unwrap();
        engine.remove_object("ctx", "p1").unwrap();
        engine.remove_object("ctx", "vlans").unwrap();
        assert_eq!(engine.context("ctx").unwrap().read().len(), 1);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_entry_leaves_table_unchanged() {
        let engine = engine_with_ports();
        engine
            .create_table("ctx", &TableDesc::exact("vlans", vec![FieldId::VLAN_ID]))
            .unwrap();

        let err = engine
            .add_entry("ctx", "vlans", &vlan(10), &[ActionDesc::transmit("missing")])
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Table(TableError::Registry(RegistryError::NotFound(_)))
        ));
        let err = engine
            .add_entry("ctx", "nope", &vlan(10), &[ActionDesc::transmit("p1")])
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Registry(RegistryError::NotFound(_))
        ));
        assert!(engine.entries("ctx", "vlans").unwrap().is_empty());
        assert_eq!(engine.context("ctx").unwrap().read().ref_count("p1"), Some(0));
        engine.shutdown().await;
    }

    #[test]
    fn test_unknown_context() {
        let engine = Engine::standard();
        let mut packet = FieldPacket::new();
        assert!(matches!(
            engine.inject("none", "t", &mut packet),
            Err(EngineError::ContextNotFound(_))
        ));
        assert!(matches!(
            engine.counters("none"),
            Err(EngineError::ContextNotFound(_))
        ));
    }
}
