//! Table builders keyed by table type.
//!
//! The registry is an explicit value built once at startup and passed to
//! whoever creates tables; there is no global registration side effect.

use super::{TableDesc, TableObject, TableType};
use crate::bridge::BridgeBuilder;
use crate::error::{Result, TableError};
use crate::exact::ExactBuilder;
use crate::prefix::PrefixBuilder;
use fwd_common::{Context, Object, ObjectRegistry, RegistryError};
use fwd_types::FieldRegistry;
use log::info;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a builder may need besides the descriptor.
pub struct BuildContext<'a> {
    /// Owning context; `None` builds a detached table with no background
    /// tasks (tests, offline tooling).
    pub context: Option<&'a Arc<Context>>,
    pub fields: &'a FieldRegistry,
    /// Objects of the owning context, for resolving default actions.
    pub objects: &'a ObjectRegistry,
}

/// Creates tables of one type.
pub trait TableBuilder: Send + Sync {
    fn build(&self, ctx: &BuildContext<'_>, desc: &TableDesc) -> Result<TableObject>;
}

/// Table type to builder mapping.
pub struct TableRegistry {
    fields: Arc<FieldRegistry>,
    builders: HashMap<TableType, Box<dyn TableBuilder>>,
}

impl TableRegistry {
    /// Creates a registry without any builders.
    pub fn new(fields: FieldRegistry) -> Self {
        Self {
            fields: Arc::new(fields),
            builders: HashMap::new(),
        }
    }

    /// Creates a registry with the exact, prefix and bridge builders, using
    /// the standard packet fields.
    pub fn standard() -> Self {
        Self::with_fields(FieldRegistry::standard())
    }

    /// Creates a registry with the built-in builders over custom fields.
    pub fn with_fields(fields: FieldRegistry) -> Self {
        let mut registry = Self::new(fields);
        registry.register(TableType::Exact, Box::new(ExactBuilder));
        registry.register(TableType::Prefix, Box::new(PrefixBuilder));
        registry.register(TableType::Bridge, Box::new(BridgeBuilder));
        registry
    }

    pub fn fields(&self) -> &FieldRegistry {
        &self.fields
    }

    /// Registers the builder for a table type, replacing any previous one.
    pub fn register(&mut self, table_type: TableType, builder: Box<dyn TableBuilder>) {
        self.builders.insert(table_type, builder);
    }

    /// Drops the builder for a table type. Intended for isolated tests.
    pub fn unregister(&mut self, table_type: TableType) -> bool {
        self.builders.remove(&table_type).is_some()
    }

    pub fn is_registered(&self, table_type: TableType) -> bool {
        self.builders.contains_key(&table_type)
    }

    /// Builds a table without inserting it anywhere.
    pub fn build(
        &self,
        context: Option<&Arc<Context>>,
        objects: &ObjectRegistry,
        desc: &TableDesc,
    ) -> Result<Box<dyn Object>> {
        let builder = self
            .builders
            .get(&desc.table_type)
            .ok_or_else(|| TableError::NoBuilder(desc.table_type.to_string()))?;
        let ctx = BuildContext {
            context,
            fields: &self.fields,
            objects,
        };
        Ok(Box::new(builder.build(&ctx, desc)?))
    }

    /// Builds a table and registers it in the context's objects.
    ///
    /// The caller holds the context write lock and passes its registry.
    pub fn create(
        &self,
        context: &Arc<Context>,
        objects: &mut ObjectRegistry,
        desc: &TableDesc,
    ) -> Result<()> {
        if desc.id.is_empty() {
            return Err(RegistryError::MissingId.into());
        }
        if objects.contains(&desc.id) {
            return Err(RegistryError::AlreadyExists(desc.id.clone()).into());
        }

        let table = self.build(Some(context), objects, desc)?;
        objects.insert(table)?;
        info!(
            "context {}: created {} table {}",
            context.id(),
            desc.table_type,
            desc.id
        );
        Ok(())
    }
}
