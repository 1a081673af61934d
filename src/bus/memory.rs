use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{Acker, BusError, Delivery, MessageBus, MessageStream, Queue};

/// In-process message bus backed by a FIFO buffer per queue.
///
/// Used by the test suite and for single-process development runs; delivery
/// semantics mirror the broker: FIFO per queue, manual ack, nack-with-requeue
/// puts the message back at the head of the queue.
#[derive(Clone, Default)]
pub struct MemoryBus {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    queues: Mutex<HashMap<&'static str, VecDeque<Vec<u8>>>>,
    notifiers: Mutex<HashMap<&'static str, Arc<Notify>>>,
    closed: AtomicBool,
}

impl Inner {
    fn notifier(&self, queue: Queue) -> Arc<Notify> {
        let mut notifiers = self.notifiers.lock().unwrap();
        notifiers
            .entry(queue.name())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    fn push_back(&self, queue: Queue, body: Vec<u8>) {
        let mut queues = self.queues.lock().unwrap();
        queues.entry(queue.name()).or_default().push_back(body);
    }

    fn push_front(&self, queue: Queue, body: Vec<u8>) {
        let mut queues = self.queues.lock().unwrap();
        queues.entry(queue.name()).or_default().push_front(body);
    }

    fn pop_front(&self, queue: Queue) -> Option<Vec<u8>> {
        let mut queues = self.queues.lock().unwrap();
        queues.get_mut(queue.name()).and_then(VecDeque::pop_front)
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently buffered on a queue.
    pub fn queue_len(&self, queue: Queue) -> usize {
        let queues = self.inner.queues.lock().unwrap();
        queues.get(queue.name()).map_or(0, VecDeque::len)
    }

    /// Close the bus; active subscriptions drain to `None`.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let notifiers = self.inner.notifiers.lock().unwrap();
        for notify in notifiers.values() {
            notify.notify_waiters();
        }
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn publish(&self, queue: Queue, body: &[u8]) -> Result<(), BusError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        self.inner.push_back(queue, body.to_vec());
        self.inner.notifier(queue).notify_one();
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: Queue,
        _prefetch: u16,
    ) -> Result<Box<dyn MessageStream>, BusError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }

        Ok(Box::new(MemoryStream {
            inner: self.inner.clone(),
            queue,
        }))
    }
}

struct MemoryStream {
    inner: Arc<Inner>,
    queue: Queue,
}

#[async_trait]
impl MessageStream for MemoryStream {
    async fn next(&mut self) -> Option<Delivery> {
        let notify = self.inner.notifier(self.queue);

        loop {
            if let Some(body) = self.inner.pop_front(self.queue) {
                return Some(Delivery::new(
                    body.clone(),
                    Box::new(MemoryAcker {
                        inner: self.inner.clone(),
                        queue: self.queue,
                        body,
                    }),
                ));
            }

            if self.inner.closed.load(Ordering::SeqCst) {
                return None;
            }

            notify.notified().await;
        }
    }
}

struct MemoryAcker {
    inner: Arc<Inner>,
    queue: Queue,
    body: Vec<u8>,
}

#[async_trait]
impl Acker for MemoryAcker {
    async fn ack(self: Box<Self>) -> Result<(), BusError> {
        Ok(())
    }

    async fn nack(self: Box<Self>, requeue: bool) -> Result<(), BusError> {
        if requeue {
            self.inner.push_front(self.queue, self.body);
            self.inner.notifier(self.queue).notify_one();
        }
        Ok(())
    }
}
