// Rust guideline compliant 2026-10-10

//! In-process broker adapter.
//!
//! [`MemoryBroker`] implements [`Connector`] over shared in-memory queues with
//! the delivery semantics the worker relies on: one consumer per queue,
//! unacknowledged messages held in flight, requeue and connection loss both
//! returning messages to the queue marked as redelivered. Controls such as
//! [`sever`](MemoryBroker::sever) and
//! [`fail_next_connects`](MemoryBroker::fail_next_connects) simulate broker
//! outages.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use domain::{BrokerChannel, BrokerError, Connector, Delivery};
use futures::Stream;
use tokio::sync::mpsc;

// ----- Shared state -----

#[derive(Debug, Clone)]
struct Message {
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Message>,
    consumer: Option<mpsc::UnboundedSender<MemoryDelivery>>,
    in_flight: HashMap<u64, Message>,
    acked: Vec<Vec<u8>>,
    requeued: usize,
    published: usize,
}

#[derive(Debug, Default)]
struct Shared {
    unreachable: bool,
    failing_connects: u32,
    connect_attempts: u32,
    refusing_consume: bool,
    channels_closed: u32,
    generation: u64,
    prefetch: Option<u16>,
    next_tag: u64,
    queues: HashMap<String, QueueState>,
}

impl Shared {
    /// Hand `message` to the queue's consumer, or park it in `ready`.
    fn dispatch(&mut self, handle: &Arc<Mutex<Self>>, queue: &str, message: Message) {
        let generation = self.generation;
        self.next_tag += 1;
        let tag = self.next_tag;
        let state = self.queues.entry(queue.to_owned()).or_default();

        if state.consumer.is_none() {
            state.ready.push_back(message);
            return;
        }
        let delivery = MemoryDelivery {
            shared: Arc::clone(handle),
            queue: queue.to_owned(),
            tag,
            generation,
            payload: message.payload.clone(),
            redelivered: message.redelivered,
        };
        let sent = state.consumer.as_ref().is_some_and(|tx| tx.send(delivery).is_ok());
        if sent {
            state.in_flight.insert(tag, message);
        } else {
            state.consumer = None;
            state.ready.push_back(message);
        }
    }

    /// Drop every consumer and return in-flight messages to the front of
    /// their queues, marked as redelivered.
    fn drop_connection(&mut self) {
        self.generation += 1;
        for state in self.queues.values_mut() {
            state.consumer = None;
            let mut tags: Vec<u64> = state.in_flight.keys().copied().collect();
            tags.sort_unstable();
            for tag in tags.into_iter().rev() {
                if let Some(mut message) = state.in_flight.remove(&tag) {
                    message.redelivered = true;
                    state.ready.push_front(message);
                }
            }
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

// ----- MemoryBroker -----

/// Shared in-memory broker. Clones refer to the same broker.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryBroker {
    /// Create a reachable broker with no queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent connect attempt fail (`false`) or succeed (`true`).
    pub fn set_reachable(&self, reachable: bool) {
        lock(&self.shared).unreachable = !reachable;
    }

    /// Make the next `count` connect attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        lock(&self.shared).failing_connects = count;
    }

    /// Number of connect attempts seen so far.
    #[must_use]
    pub fn connect_attempts(&self) -> u32 {
        lock(&self.shared).connect_attempts
    }

    /// Make `consume` fail with a protocol error (`true`), as a broker that
    /// refuses access to the queue would.
    pub fn refuse_consume(&self, refuse: bool) {
        lock(&self.shared).refusing_consume = refuse;
    }

    /// Number of channels closed by their owner.
    #[must_use]
    pub fn channels_closed(&self) -> u32 {
        lock(&self.shared).channels_closed
    }

    /// Simulate a dropped connection: open channels become closed, consumer
    /// streams end and unacknowledged messages return to their queues.
    pub fn sever(&self) {
        lock(&self.shared).drop_connection();
    }

    /// Enqueue a raw payload as if another producer had published it.
    pub fn inject(&self, queue: &str, payload: impl Into<Vec<u8>>) {
        let mut shared = lock(&self.shared);
        shared.dispatch(
            &self.shared,
            queue,
            Message { payload: payload.into(), redelivered: false },
        );
    }

    /// `true` once `queue` has been declared or used.
    #[must_use]
    pub fn is_declared(&self, queue: &str) -> bool {
        lock(&self.shared).queues.contains_key(queue)
    }

    /// Last prefetch limit applied by any channel.
    #[must_use]
    pub fn prefetch(&self) -> Option<u16> {
        lock(&self.shared).prefetch
    }

    /// Messages published to `queue` through a channel.
    #[must_use]
    pub fn published(&self, queue: &str) -> usize {
        self.with_queue(queue, |q| q.published).unwrap_or(0)
    }

    /// Payloads waiting in `queue`, in delivery order.
    #[must_use]
    pub fn ready(&self, queue: &str) -> Vec<Vec<u8>> {
        self.with_queue(queue, |q| q.ready.iter().map(|m| m.payload.clone()).collect())
            .unwrap_or_default()
    }

    /// Payloads acknowledged on `queue`, in ack order.
    #[must_use]
    pub fn acked(&self, queue: &str) -> Vec<Vec<u8>> {
        self.with_queue(queue, |q| q.acked.clone()).unwrap_or_default()
    }

    /// Number of explicit requeues on `queue`.
    #[must_use]
    pub fn requeued(&self, queue: &str) -> usize {
        self.with_queue(queue, |q| q.requeued).unwrap_or(0)
    }

    /// Deliveries on `queue` handed out but not yet settled.
    #[must_use]
    pub fn in_flight(&self, queue: &str) -> usize {
        self.with_queue(queue, |q| q.in_flight.len()).unwrap_or(0)
    }

    fn with_queue<T>(&self, queue: &str, f: impl FnOnce(&QueueState) -> T) -> Option<T> {
        lock(&self.shared).queues.get(queue).map(f)
    }
}

impl Connector for MemoryBroker {
    type Channel = MemoryChannel;

    async fn open(&self) -> Result<MemoryChannel, BrokerError> {
        let mut shared = lock(&self.shared);
        shared.connect_attempts += 1;
        if shared.unreachable {
            return Err(BrokerError::Connect { reason: "memory broker unreachable".to_owned() });
        }
        if shared.failing_connects > 0 {
            shared.failing_connects -= 1;
            return Err(BrokerError::Connect { reason: "connection refused".to_owned() });
        }
        Ok(MemoryChannel {
            shared: Arc::clone(&self.shared),
            generation: shared.generation,
            closed: AtomicBool::new(false),
        })
    }
}

// ----- MemoryChannel -----

/// Channel on a [`MemoryBroker`]; closed by [`MemoryBroker::sever`].
#[derive(Debug)]
pub struct MemoryChannel {
    shared: Arc<Mutex<Shared>>,
    generation: u64,
    closed: AtomicBool,
}

impl MemoryChannel {
    fn open_guard(&self) -> Result<MutexGuard<'_, Shared>, BrokerError> {
        let shared = lock(&self.shared);
        if self.closed.load(Ordering::Acquire) || shared.generation != self.generation {
            return Err(BrokerError::ChannelClosed);
        }
        Ok(shared)
    }
}

impl BrokerChannel for MemoryChannel {
    type Delivery = MemoryDelivery;
    type Deliveries = MemoryDeliveries;

    fn is_open(&self) -> bool {
        self.open_guard().is_ok()
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), BrokerError> {
        self.open_guard()?.queues.entry(queue.to_owned()).or_default();
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError> {
        self.open_guard()?.prefetch = Some(count);
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let mut shared = self.open_guard()?;
        shared.queues.entry(queue.to_owned()).or_default().published += 1;
        shared.dispatch(
            &self.shared,
            queue,
            Message { payload: payload.to_vec(), redelivered: false },
        );
        Ok(())
    }

    async fn consume(&self, queue: &str, _consumer_tag: &str) -> Result<MemoryDeliveries, BrokerError> {
        let mut shared = self.open_guard()?;
        if shared.refusing_consume {
            return Err(BrokerError::Protocol { reason: format!("ACCESS_REFUSED to queue {queue}") });
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let backlog: Vec<Message> = {
            let state = shared.queues.entry(queue.to_owned()).or_default();
            state.consumer = Some(tx);
            state.ready.drain(..).collect()
        };
        for message in backlog {
            shared.dispatch(&self.shared, queue, message);
        }
        Ok(MemoryDeliveries { rx })
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut shared = lock(&self.shared);
        shared.channels_closed += 1;
        if shared.generation == self.generation {
            shared.drop_connection();
        }
        Ok(())
    }
}

// ----- Deliveries -----

/// Consumer stream; ends when the channel is severed or closed.
#[derive(Debug)]
pub struct MemoryDeliveries {
    rx: mpsc::UnboundedReceiver<MemoryDelivery>,
}

impl Stream for MemoryDeliveries {
    type Item = Result<MemoryDelivery, BrokerError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|next| next.map(Ok))
    }
}

/// One in-flight message on a [`MemoryBroker`] queue.
#[derive(Debug)]
pub struct MemoryDelivery {
    shared: Arc<Mutex<Shared>>,
    queue: String,
    tag: u64,
    generation: u64,
    payload: Vec<u8>,
    redelivered: bool,
}

impl MemoryDelivery {
    fn settle(&self) -> Result<(MutexGuard<'_, Shared>, Message), BrokerError> {
        let mut shared = lock(&self.shared);
        if shared.generation != self.generation {
            return Err(BrokerError::ChannelClosed);
        }
        let message = shared
            .queues
            .get_mut(&self.queue)
            .and_then(|q| q.in_flight.remove(&self.tag))
            .ok_or_else(|| BrokerError::Protocol {
                reason: format!("unknown delivery tag {}", self.tag),
            })?;
        Ok((shared, message))
    }
}

impl Delivery for MemoryDelivery {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn redelivered(&self) -> bool {
        self.redelivered
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        let (mut shared, message) = self.settle()?;
        if let Some(state) = shared.queues.get_mut(&self.queue) {
            state.acked.push(message.payload);
        }
        Ok(())
    }

    async fn requeue(&self) -> Result<(), BrokerError> {
        let (mut shared, mut message) = self.settle()?;
        if let Some(state) = shared.queues.get_mut(&self.queue) {
            state.requeued += 1;
        }
        message.redelivered = true;
        shared.dispatch(&self.shared, &self.queue, message);
        Ok(())
    }
}

// ----- Tests -----
