//! Eviction order for transient exact-match entries.
//!
//! The list is kept least-recently-used first: new and refreshed entries go
//! to the tail, expiry always pops from the head. Nodes live in a slab and
//! link to each other by index; a node index stays valid for as long as the
//! node is on the list, so the owning entry can hold it across refreshes.

use slab::Slab;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Time to wait for new work when nothing is pending.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(60);

/// Time source for stale deadlines. Tests swap in a manual clock.
pub type Clock = Arc<dyn Fn() -> Instant + Send + Sync>;

struct Node {
    entry: usize,
    stale_time: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Transient entries ordered by stale deadline.
pub struct StaleList {
    nodes: Slab<Node>,
    head: Option<usize>,
    tail: Option<usize>,
    timeout: Duration,
    clock: Clock,
    wake: Arc<Notify>,
}

impl StaleList {
    pub fn new(timeout: Duration) -> Self {
        Self {
            nodes: Slab::new(),
            head: None,
            tail: None,
            timeout,
            clock: Arc::new(Instant::now),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_clock(&mut self, clock: Clock) {
        self.clock = clock;
    }

    /// Notified whenever an entry lands on an empty list, so a sleeping
    /// sweeper can shorten its wait.
    pub fn wake(&self) -> Arc<Notify> {
        Arc::clone(&self.wake)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends an entry with a fresh deadline and returns its node index.
    pub fn push(&mut self, entry: usize) -> usize {
        let was_empty = self.is_empty();
        let node = self.nodes.insert(Node {
            entry,
            stale_time: (self.clock)() + self.timeout,
            prev: None,
            next: None,
        });
        self.link_tail(node);
        if was_empty {
            self.wake.notify_one();
        }
        node
    }

    /// Resets a node's deadline and moves it to the tail.
    pub fn touch(&mut self, node: usize) {
        let stale_time = (self.clock)() + self.timeout;
        let Some(n) = self.nodes.get_mut(node) else {
            return;
        };
        n.stale_time = stale_time;
        if self.tail != Some(node) {
            self.unlink(node);
            self.link_tail(node);
        }
    }

    /// Takes a node off the list, returning the entry it tracked.
    pub fn remove(&mut self, node: usize) -> Option<usize> {
        if !self.nodes.contains(node) {
            return None;
        }
        self.unlink(node);
        Some(self.nodes.remove(node).entry)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.head = None;
        self.tail = None;
    }

    /// Pops every node whose deadline has passed, oldest first.
    ///
    /// Returns the expired entries and the time until the next deadline,
    /// or [`DEFAULT_WAIT`] if the list is now empty.
    pub fn expire(&mut self) -> (Vec<usize>, Duration) {
        let now = (self.clock)();
        let mut expired = Vec::new();
        while let Some(head) = self.head {
            let stale_time = self.nodes[head].stale_time;
            if stale_time > now {
                return (expired, stale_time - now);
            }
            self.unlink(head);
            expired.push(self.nodes.remove(head).entry);
        }
        (expired, DEFAULT_WAIT)
    }

    /// Entries in eviction order.
    pub fn order(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut cursor = self.head;
        while let Some(node) = cursor {
            out.push(self.nodes[node].entry);
            cursor = self.nodes[node].next;
        }
        out
    }

    fn link_tail(&mut self, node: usize) {
        let prev = self.tail;
        {
            let n = &mut self.nodes[node];
            n.prev = prev;
            n.next = None;
        }
        match prev {
            Some(prev) => self.nodes[prev].next = Some(node),
            None => self.head = Some(node),
        }
        self.tail = Some(node);
    }

    fn unlink(&mut self, node: usize) {
        let (prev, next) = {
            let n = &self.nodes[node];
            (n.prev, n.next)
        };
        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }
        let n = &mut self.nodes[node];
        n.prev = None;
        n.next = None;
    }
}

impl std::fmt::Debug for StaleList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaleList")
            .field("len", &self.nodes.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}
