//! Context: the unit of isolation and locking.
//!
//! A context owns an [`ObjectRegistry`] behind a single reader/writer lock.
//! Lock discipline for everything living in a context:
//!
//! 1. Packet processing holds the **read** lock; many packets may be in
//!    flight concurrently.
//! 2. Provisioning (create/remove objects, add/remove/clear entries) holds
//!    the **write** lock.
//! 3. Private locks inside objects nest *inside* the context lock. A
//!    background task that needs both takes the context write lock first.
//! 4. Background tasks never run while the packet that triggered them still
//!    holds a read lock; they acquire the write lock on their own.
//!
//! Background tasks are tracked per context. [`Context::destroy`] cleans up
//! all objects and then waits for every tracked task to exit.

use crate::deadlock::{read_or_report, write_or_report, DeadlockTimer, DEFAULT_DEADLOCK_TIMEOUT};
use crate::error::{RegistryError, RegistryResult};
use crate::registry::ObjectRegistry;
use log::{debug, info};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;

/// Per-context settings.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Lock waits or holds longer than this are logged. Zero disables.
    pub deadlock_timeout: Duration,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            deadlock_timeout: DEFAULT_DEADLOCK_TIMEOUT,
        }
    }
}

/// Names a context lock in deadlock reports.
#[derive(Debug, Clone, Copy)]
struct LockLabel<'a> {
    mode: &'static str,
    context: &'a str,
}

impl<'a> LockLabel<'a> {
    fn new(mode: &'static str, context: &'a str) -> Self {
        Self { mode, context }
    }
}

impl fmt::Display for LockLabel<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} lock on context {}", self.mode, self.context)
    }
}

/// Read access to a context's objects.
pub struct ContextReadGuard<'a> {
    guard: RwLockReadGuard<'a, ObjectRegistry>,
    _timer: DeadlockTimer<LockLabel<'a>>,
}

impl Deref for ContextReadGuard<'_> {
    type Target = ObjectRegistry;

    fn deref(&self) -> &ObjectRegistry {
        &self.guard
    }
}

/// Exclusive access to a context's objects.
pub struct ContextWriteGuard<'a> {
    guard: RwLockWriteGuard<'a, ObjectRegistry>,
    _timer: DeadlockTimer<LockLabel<'a>>,
}

impl Deref for ContextWriteGuard<'_> {
    type Target = ObjectRegistry;

    fn deref(&self) -> &ObjectRegistry {
        &self.guard
    }
}

impl DerefMut for ContextWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut ObjectRegistry {
        &mut self.guard
    }
}

/// A named set of forwarding objects sharing one lock.
pub struct Context {
    id: String,
    config: ContextConfig,
    objects: RwLock<ObjectRegistry>,
    tasks: TaskTracker,
    destroyed: AtomicBool,
}

impl Context {
    /// Creates an empty context.
    pub fn new(id: impl Into<String>, config: ContextConfig) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            config,
            objects: RwLock::new(ObjectRegistry::new()),
            tasks: TaskTracker::new(),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Takes the context read lock (packet processing).
    pub fn read(&self) -> ContextReadGuard<'_> {
        let timeout = self.config.deadlock_timeout;
        let guard = read_or_report(&self.objects, &self.id, timeout);
        ContextReadGuard {
            guard,
            _timer: DeadlockTimer::start(LockLabel::new("read", &self.id), timeout),
        }
    }

    /// Takes the context write lock (provisioning and background mutation).
    pub fn write(&self) -> ContextWriteGuard<'_> {
        let timeout = self.config.deadlock_timeout;
        let guard = write_or_report(&self.objects, &self.id, timeout);
        ContextWriteGuard {
            guard,
            _timer: DeadlockTimer::start(LockLabel::new("write", &self.id), timeout),
        }
    }

    /// Tracker for the context's background tasks.
    pub fn tasks(&self) -> &TaskTracker {
        &self.tasks
    }

    /// Spawns a background task owned by this context.
    pub fn spawn<F>(&self, name: &str, task: F) -> RegistryResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_destroyed() {
            return Err(RegistryError::Destroyed(self.id.clone()));
        }
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| RegistryError::NoRuntime(self.id.clone()))?;
        debug!("context {}: spawning {}", self.id, name);
        self.tasks.spawn_on(task, &handle);
        Ok(())
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Tears the context down.
    ///
    /// Every object is cleaned up under the write lock, then the lock is
    /// released and this waits for all background tasks to finish. Returns
    /// the number of objects that were removed.
    pub async fn destroy(&self) -> usize {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let removed = self.write().cleanup_all();
        self.tasks.close();
        self.tasks.wait().await;
        info!(
            "context {}: destroyed ({} objects removed)",
            self.id, removed
        );
        removed
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("tasks", &self.tasks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Object;
    use pretty_assertions::assert_eq;
    use std::any::Any;
    use std::sync::atomic::AtomicUsize;

    struct Flag {
        id: String,
        cleanups: Arc<AtomicUsize>,
    }

    impl Object for Flag {
        fn id(&self) -> &str {
            &self.id
        }
        fn kind(&self) -> &'static str {
            "flag"
        }
        fn cleanup(&mut self) {
            self.cleanups.fetch_add(1, Ordering::AcqRel);
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_read_and_write_access() {
        let ctx = Context::new("ctx", ContextConfig::default());
        let cleanups = Arc::new(AtomicUsize::new(0));
        ctx.write()
            .insert(Box::new(Flag {
                id: "f".into(),
                cleanups: Arc::clone(&cleanups),
            }))
            .unwrap();

        let r1 = ctx.read();
        let r2 = ctx.read();
        assert!(r1.contains("f"));
        assert!(r2.contains("f"));
    }

    #[test]
    fn test_spawn_requires_runtime() {
        let ctx = Context::new("nort", ContextConfig::default());
        assert_eq!(
            ctx.spawn("noop", async {}),
            Err(RegistryError::NoRuntime("nort".into()))
        );
    }

    #[tokio::test]
    async fn test_destroy_cleans_objects_and_joins_tasks() {
        let ctx = Context::new("ctx", ContextConfig::default());
        let cleanups = Arc::new(AtomicUsize::new(0));
        ctx.write()
            .insert(Box::new(Flag {
                id: "f".into(),
                cleanups: Arc::clone(&cleanups),
            }))
            .unwrap();

        let finished = Arc::new(AtomicBool::new(false));
        let done = Arc::clone(&finished);
        ctx.spawn("sleeper", async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            done.store(true, Ordering::Release);
        })
        .unwrap();

        assert_eq!(ctx.destroy().await, 1);
        assert!(finished.load(Ordering::Acquire));
        assert_eq!(cleanups.load(Ordering::Acquire), 1);
        assert!(ctx.read().is_empty());

        // A destroyed context refuses new work and destroys only once.
        assert!(ctx.spawn("late", async {}).is_err());
        assert_eq!(ctx.destroy().await, 0);
    }
}
