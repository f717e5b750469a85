//! FIFO work queue decoupling producers on the packet path from consumers
//! that mutate state.
//!
//! A queue owns two background loops once [`Queue::run`] is called:
//!
//! - **ingress** drains the input channel into an internal buffer, so
//!   writers never wait on a slow consumer;
//! - **egress** hands buffered elements to the output channel one at a time.
//!
//! [`Queue::close`] stops accepting writes. Elements already written are
//! still delivered; once the buffer is drained the output side reports
//! end-of-queue and [`Queue::receive`] returns `None`.

use crate::error::{QueueError, QueueResult};
use log::{debug, trace};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio_util::task::TaskTracker;

/// State shared between the queue handle and its two loops.
struct Shared<T> {
    buffer: Mutex<VecDeque<T>>,
    wake: Notify,
    ingress_done: AtomicBool,
}

/// A FIFO producer/consumer queue with optional capacity.
pub struct Queue<T> {
    name: String,
    max: Option<usize>,
    shared: Arc<Shared<T>>,
    input_tx: Mutex<Option<mpsc::UnboundedSender<T>>>,
    input_rx: Mutex<Option<mpsc::UnboundedReceiver<T>>>,
    output_tx: Mutex<Option<mpsc::Sender<T>>>,
    output_rx: tokio::sync::Mutex<mpsc::Receiver<T>>,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    closed: AtomicBool,
    running: AtomicBool,
}

impl<T: Send + 'static> Queue<T> {
    /// Creates a queue. `max = None` means unbounded.
    pub fn new(name: impl Into<String>, max: Option<usize>) -> Self {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::channel(1);
        Self {
            name: name.into(),
            max,
            shared: Arc::new(Shared {
                buffer: Mutex::new(VecDeque::new()),
                wake: Notify::new(),
                ingress_done: AtomicBool::new(false),
            }),
            input_tx: Mutex::new(Some(input_tx)),
            input_rx: Mutex::new(Some(input_rx)),
            output_tx: Mutex::new(Some(output_tx)),
            output_rx: tokio::sync::Mutex::new(output_rx),
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            running: AtomicBool::new(false),
        }
    }

    /// Creates an unbounded queue.
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    /// Creates a queue holding at most `max` undelivered elements.
    pub fn bounded(name: impl Into<String>, max: usize) -> Self {
        Self::new(name, Some(max))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts the ingress and egress loops on the given tracker.
    pub fn run(&self, tracker: &TaskTracker) -> QueueResult<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| QueueError::NoRuntime(self.name.clone()))?;
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(QueueError::AlreadyRunning(self.name.clone()));
        }

        let input = self.input_rx.lock().take();
        let output = self.output_tx.lock().take();
        let (Some(input), Some(output)) = (input, output) else {
            // Closed before ever running: the output side is already gone.
            return Ok(());
        };

        tracker.spawn_on(ingress(Arc::clone(&self.shared), input), &handle);
        tracker.spawn_on(
            egress(Arc::clone(&self.shared), output, self.name.clone()),
            &handle,
        );
        debug!("queue {}: running (max {:?})", self.name, self.max);
        Ok(())
    }

    /// Enqueues an element without blocking.
    ///
    /// Fails if the queue is closed, or if a bounded queue already holds
    /// `max` undelivered elements.
    pub fn write(&self, elem: T) -> QueueResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed(self.name.clone()));
        }
        if let Some(max) = self.max {
            if self.len() >= max as u64 {
                return Err(QueueError::Full {
                    name: self.name.clone(),
                    max,
                });
            }
        }

        let sender = self.input_tx.lock();
        match sender.as_ref() {
            Some(tx) => {
                tx.send(elem)
                    .map_err(|_| QueueError::Closed(self.name.clone()))?;
                self.enqueued.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            None => Err(QueueError::Closed(self.name.clone())),
        }
    }

    /// Waits for the next element.
    ///
    /// Returns `None` once the queue is closed and fully drained.
    pub async fn receive(&self) -> Option<T> {
        let elem = self.output_rx.lock().await.recv().await;
        if elem.is_some() {
            self.dequeued.fetch_add(1, Ordering::AcqRel);
        }
        elem
    }

    /// Returns the next element if one is ready right now.
    pub fn try_receive(&self) -> Option<T> {
        let mut rx = self.output_rx.try_lock().ok()?;
        let elem = rx.try_recv().ok();
        if elem.is_some() {
            self.dequeued.fetch_add(1, Ordering::AcqRel);
        }
        elem
    }

    /// Stops accepting writes. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Dropping the sender ends the ingress loop once it drains.
        self.input_tx.lock().take();
        if !self.running.load(Ordering::Acquire) {
            self.output_tx.lock().take();
        }
        debug!(
            "queue {}: closed ({} enqueued, {} dequeued)",
            self.name,
            self.enqueued(),
            self.dequeued()
        );
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of elements written but not yet received.
    pub fn len(&self) -> u64 {
        self.enqueued().saturating_sub(self.dequeued())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of successful writes.
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Acquire)
    }

    /// Total number of elements handed to receivers.
    pub fn dequeued(&self) -> u64 {
        self.dequeued.load(Ordering::Acquire)
    }
}

async fn ingress<T>(shared: Arc<Shared<T>>, mut input: mpsc::UnboundedReceiver<T>) {
    while let Some(elem) = input.recv().await {
        shared.buffer.lock().push_back(elem);
        shared.wake.notify_one();
    }
    shared.ingress_done.store(true, Ordering::Release);
    shared.wake.notify_one();
}

async fn egress<T>(shared: Arc<Shared<T>>, output: mpsc::Sender<T>, name: String) {
    loop {
        let next = shared.buffer.lock().pop_front();
        match next {
            Some(elem) => {
                if output.send(elem).await.is_err() {
                    trace!("queue {}: receiver dropped", name);
                    return;
                }
            }
            None => {
                if shared.ingress_done.load(Ordering::Acquire) && shared.buffer.lock().is_empty() {
                    trace!("queue {}: drained", name);
                    return;
                }
                shared.wake.notified().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let tracker = TaskTracker::new();
        let queue = Queue::unbounded("fifo");
        queue.run(&tracker).unwrap();

        for i in 0..100 {
            queue.write(i).unwrap();
        }
        for i in 0..100 {
            assert_eq!(queue.receive().await, Some(i));
        }
        assert_eq!(queue.enqueued(), 100);
        assert_eq!(queue.dequeued(), 100);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_try_receive_does_not_wait() {
        let tracker = TaskTracker::new();
        let queue: Queue<u32> = Queue::unbounded("poll");
        assert_eq!(queue.try_receive(), None);
        queue.run(&tracker).unwrap();
        queue.write(7).unwrap();

        let mut got = None;
        for _ in 0..100 {
            got = queue.try_receive();
            if got.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(got, Some(7));
        assert_eq!(queue.try_receive(), None);
        assert_eq!(queue.dequeued(), 1);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let tracker = TaskTracker::new();
        let queue = Queue::unbounded("drain");
        queue.run(&tracker).unwrap();

        queue.write("a").unwrap();
        queue.write("b").unwrap();
        queue.close();

        assert_eq!(queue.write("c"), Err(QueueError::Closed("drain".into())));
        assert_eq!(queue.receive().await, Some("a"));
        assert_eq!(queue.receive().await, Some("b"));
        assert_eq!(queue.receive().await, None);

        tracker.close();
        tracker.wait().await;
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let tracker = TaskTracker::new();
        let queue: Queue<u32> = Queue::unbounded("idem");
        queue.run(&tracker).unwrap();
        queue.close();
        queue.close();
        assert!(queue.is_closed());
        assert_eq!(queue.receive().await, None);
    }

    #[tokio::test]
    async fn test_close_without_run_does_not_block() {
        let queue: Queue<u32> = Queue::unbounded("idle");
        queue.close();
        assert_eq!(queue.receive().await, None);
    }

    #[tokio::test]
    async fn test_bounded_rejects_when_full() {
        let tracker = TaskTracker::new();
        let queue = Queue::bounded("bounded", 2);
        queue.run(&tracker).unwrap();

        queue.write(1).unwrap();
        queue.write(2).unwrap();
        assert_eq!(
            queue.write(3),
            Err(QueueError::Full {
                name: "bounded".into(),
                max: 2
            })
        );

        assert_eq!(queue.receive().await, Some(1));
        queue.write(3).unwrap();
        assert_eq!(queue.receive().await, Some(2));
        assert_eq!(queue.receive().await, Some(3));
    }

    #[tokio::test]
    async fn test_run_twice_fails() {
        let tracker = TaskTracker::new();
        let queue: Queue<u8> = Queue::unbounded("twice");
        queue.run(&tracker).unwrap();
        assert_eq!(
            queue.run(&tracker),
            Err(QueueError::AlreadyRunning("twice".into()))
        );
    }

    #[test]
    fn test_run_outside_runtime_fails() {
        let tracker = TaskTracker::new();
        let queue: Queue<u8> = Queue::unbounded("nort");
        assert_eq!(queue.run(&tracker), Err(QueueError::NoRuntime("nort".into())));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_producer_consumer() {
        let tracker = TaskTracker::new();
        let queue = Arc::new(Queue::unbounded("concurrent"));
        queue.run(&tracker).unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                for i in 0..1000u32 {
                    queue.write(i).unwrap();
                    if i % 100 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
                queue.close();
            })
        };

        let mut received = Vec::new();
        while let Some(v) = queue.receive().await {
            received.push(v);
        }
        producer.await.unwrap();
        assert_eq!(received, (0..1000).collect::<Vec<_>>());
    }

    proptest! {
        #[test]
        fn prop_reads_follow_write_order(values in proptest::collection::vec(any::<u16>(), 0..64)) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let received = rt.block_on(async {
                let tracker = TaskTracker::new();
                let queue = Queue::unbounded("prop");
                queue.run(&tracker).unwrap();
                for v in &values {
                    queue.write(*v).unwrap();
                }
                queue.close();
                let mut out = Vec::new();
                while let Some(v) = queue.receive().await {
                    out.push(v);
                }
                out
            });
            prop_assert_eq!(received, values);
        }
    }
}
