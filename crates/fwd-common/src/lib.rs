//! Shared plumbing for the forwarding dataplane.
//!
//! - [`Queue`]: FIFO producer/consumer queue with graceful close-draining
//! - [`ObjectRegistry`] / [`ObjectHandle`]: id-keyed object store with
//!   counted references
//! - [`Context`]: isolation unit owning a registry behind one reader/writer
//!   lock, plus the background tasks of its objects
//! - [`DeadlockTimer`]: diagnostic logging for long lock waits and holds
//!
//! # Example
//!
//! ```ignore
//! use fwd_common::{Context, ContextConfig};
//!
//! let ctx = Context::new("vrf-blue", ContextConfig::default());
//! ctx.write().insert(Box::new(port))?;     // provisioning
//! let objects = ctx.read();                // packet processing
//! let port = objects.find_by_nid(7)?;
//! ```

mod context;
mod deadlock;
mod error;
mod queue;
mod registry;

pub use context::{Context, ContextConfig, ContextReadGuard, ContextWriteGuard};
pub use deadlock::{read_or_report, write_or_report, DeadlockTimer, DEFAULT_DEADLOCK_TIMEOUT};
pub use error::{QueueError, QueueResult, RegistryError, RegistryResult};
pub use queue::Queue;
pub use registry::{Object, ObjectHandle, ObjectRegistry};
