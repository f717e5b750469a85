//! Packet-processing counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated on the packet path.
///
/// All fields are relaxed atomics so concurrent readers can bump them while
/// holding only the context read lock.
#[derive(Debug, Default)]
pub struct Counters {
    pub rx_packets: AtomicU64,
    pub tx_packets: AtomicU64,
    pub drops: AtomicU64,
    pub errors: AtomicU64,
    pub table_hits: AtomicU64,
    pub table_misses: AtomicU64,
    pub learn_requests: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a plain copy of the current values.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            rx_packets: self.rx_packets.load(Ordering::Relaxed),
            tx_packets: self.tx_packets.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            table_hits: self.table_hits.load(Ordering::Relaxed),
            table_misses: self.table_misses.load(Ordering::Relaxed),
            learn_requests: self.learn_requests.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`Counters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub drops: u64,
    pub errors: u64,
    pub table_hits: u64,
    pub table_misses: u64,
    pub learn_requests: u64,
}
