//! Object registry owned by a [`crate::Context`].
//!
//! The registry maps string ids to forwarding objects (tables, ports, ...)
//! and never creates entries implicitly: lookups return `Option`/`Result`
//! and insertion is always explicit.
//!
//! # Reference counting
//!
//! Actions that point at other objects (transmit to a port, continue into
//! a table) hold an [`ObjectHandle`]. A handle is acquired from the
//! registry, cloning it takes another reference and dropping it releases
//! one. An object cannot be removed while any handle to it is alive, so a
//! referenced object always outlives the actions that name it.

use crate::error::{RegistryError, RegistryResult};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Anything that can live in a context's registry.
pub trait Object: Any + Send + Sync {
    /// Registry id of the object.
    fn id(&self) -> &str;

    /// Short type name used in logs and type-mismatch errors.
    fn kind(&self) -> &'static str;

    /// Numeric id, for objects that are addressable by number (ports).
    fn nid(&self) -> Option<u64> {
        None
    }

    /// Releases everything the object owns and stops its background work.
    ///
    /// Called exactly once, with the context write lock held, right before
    /// the object leaves the registry.
    fn cleanup(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Slot {
    object: Box<dyn Object>,
    refs: Arc<AtomicUsize>,
}

/// A counted reference to a registered object.
///
/// Dropping the handle is the release.
pub struct ObjectHandle {
    id: Arc<str>,
    refs: Arc<AtomicUsize>,
}

impl ObjectHandle {
    /// Id of the referenced object.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current number of live handles to the object.
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }
}

impl Clone for ObjectHandle {
    fn clone(&self) -> Self {
        self.refs.fetch_add(1, Ordering::AcqRel);
        Self {
            id: Arc::clone(&self.id),
            refs: Arc::clone(&self.refs),
        }
    }
}

impl Drop for ObjectHandle {
    fn drop(&mut self) {
        self.refs.fetch_sub(1, Ordering::AcqRel);
    }
}

impl PartialEq for ObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ObjectHandle {}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHandle({})", self.id)
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Id-keyed store of the objects belonging to one context.
#[derive(Default)]
pub struct ObjectRegistry {
    objects: HashMap<String, Slot>,
    nids: HashMap<u64, String>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    /// Registers an object under its own id.
    ///
    /// A rejected object is cleaned up before it is dropped, so any
    /// background work it started does not outlive the failed insert.
    pub fn insert(&mut self, mut object: Box<dyn Object>) -> RegistryResult<()> {
        if let Err(err) = self.check_insert(object.as_ref()) {
            object.cleanup();
            return Err(err);
        }
        let id = object.id().to_string();
        if let Some(nid) = object.nid() {
            self.nids.insert(nid, id.clone());
        }
        self.objects.insert(
            id,
            Slot {
                object,
                refs: Arc::new(AtomicUsize::new(0)),
            },
        );
        Ok(())
    }

    fn check_insert(&self, object: &dyn Object) -> RegistryResult<()> {
        let id = object.id();
        if id.is_empty() {
            return Err(RegistryError::MissingId);
        }
        if self.objects.contains_key(id) {
            return Err(RegistryError::AlreadyExists(id.to_string()));
        }
        if let Some(nid) = object.nid() {
            if let Some(owner) = self.nids.get(&nid) {
                return Err(RegistryError::NidInUse {
                    nid,
                    owner: owner.clone(),
                });
            }
        }
        Ok(())
    }

    /// Returns an object by id. **This never creates entries.**
    pub fn get(&self, id: &str) -> RegistryResult<&dyn Object> {
        self.objects
            .get(id)
            .map(|slot| slot.object.as_ref())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Returns an object by id for mutation.
    pub fn get_mut(&mut self, id: &str) -> RegistryResult<&mut dyn Object> {
        match self.objects.get_mut(id) {
            Some(slot) => Ok(slot.object.as_mut()),
            None => Err(RegistryError::NotFound(id.to_string())),
        }
    }

    /// Returns an object downcast to a concrete type.
    pub fn get_as<T: Object>(&self, id: &str) -> RegistryResult<&T> {
        self.get(id)?
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| RegistryError::TypeMismatch {
                id: id.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Resolves a numerically addressed object to its id.
    pub fn find_by_nid(&self, nid: u64) -> RegistryResult<&dyn Object> {
        let id = self
            .nids
            .get(&nid)
            .ok_or_else(|| RegistryError::NotFound(format!("nid {}", nid)))?;
        self.get(id)
    }

    /// Takes a counted reference to an object.
    pub fn acquire(&self, id: &str) -> RegistryResult<ObjectHandle> {
        let (key, slot) = self
            .objects
            .get_key_value(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        slot.refs.fetch_add(1, Ordering::AcqRel);
        Ok(ObjectHandle {
            id: Arc::from(key.as_str()),
            refs: Arc::clone(&slot.refs),
        })
    }

    /// Returns the number of live handles to an object.
    pub fn ref_count(&self, id: &str) -> Option<usize> {
        self.objects
            .get(id)
            .map(|slot| slot.refs.load(Ordering::Acquire))
    }

    /// Cleans up and removes an object.
    ///
    /// Fails with [`RegistryError::InUse`] while handles to it are alive;
    /// the object is left untouched in that case.
    pub fn remove(&mut self, id: &str) -> RegistryResult<Box<dyn Object>> {
        let refs = self
            .ref_count(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if refs > 0 {
            return Err(RegistryError::InUse {
                id: id.to_string(),
                refs,
            });
        }
        let mut slot = self
            .objects
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if let Some(nid) = slot.object.nid() {
            self.nids.remove(&nid);
        }
        slot.object.cleanup();
        Ok(slot.object)
    }

    /// Cleans up every object, then empties the registry regardless of
    /// outstanding references. Used when the whole context goes away.
    pub fn cleanup_all(&mut self) -> usize {
        for slot in self.objects.values_mut() {
            slot.object.cleanup();
        }
        let count = self.objects.len();
        self.objects.clear();
        self.nids.clear();
        count
    }

    /// Returns all registered ids.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("objects", &self.objects.keys().collect::<Vec<_>>())
            .finish()
    }
}
