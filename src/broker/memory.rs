//! In-process broker
//!
//! This module contains an in-memory broker that speaks the same
//! [`Dialer`]/[`Session`] seam as the AMQP transport. It is responsible for:
//! - managing declared queues and the consumers attached to them
//! - routing published messages to a queue by routing key (default exchange)
//! - buffering messages for queues without consumers
//! - tearing down a session's consumers when the session closes
//!
//! Concurrency and usage notes:
//! - State lives behind a `std::sync::Mutex`; the lock is never held across
//!   an `.await`.
//! - Delivery to consumers goes through unbounded mpsc channels, so a
//!   consumer sees everything already handed to it even after its session
//!   closes, and then its stream ends.
//! - The broker can be made unreachable or told to stall publishes, which is
//!   how retry and timeout behavior is exercised without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broker::message::Message;
use crate::broker::transport::{DeliveryStream, Dialer, Session};
use crate::utils::TransportError;

pub type SessionId = String;

type DeliverySender = mpsc::UnboundedSender<Message>;

#[derive(Debug)]
struct Consumer {
    tag: String,
    session: SessionId,
    sender: DeliverySender,
}

/// A named queue with its consumers and undelivered backlog.
#[derive(Debug, Default)]
struct Queue {
    name: String,
    consumers: Vec<Consumer>,
    backlog: VecDeque<Message>,
    next: usize,
}

impl Queue {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Hands `msg` to the next live consumer in round-robin order, or keeps
    /// it in the backlog when nobody is listening.
    fn deliver(&mut self, mut msg: Message) {
        while !self.consumers.is_empty() {
            let idx = self.next % self.consumers.len();
            match self.consumers[idx].sender.send(msg) {
                Ok(()) => {
                    self.next = idx + 1;
                    return;
                }
                Err(mpsc::error::SendError(returned)) => {
                    let gone = self.consumers.remove(idx);
                    debug!(queue = %self.name, consumer = %gone.tag, "dropping dead consumer");
                    msg = returned;
                }
            }
        }
        self.backlog.push_back(msg);
    }

    fn attach(&mut self, consumer: Consumer) {
        while let Some(msg) = self.backlog.pop_front() {
            if let Err(mpsc::error::SendError(msg)) = consumer.sender.send(msg) {
                self.backlog.push_front(msg);
                return;
            }
        }
        self.consumers.push(consumer);
    }

    fn detach_session(&mut self, session: &SessionId) {
        self.consumers.retain(|c| &c.session != session);
    }
}

#[derive(Debug)]
struct BrokerState {
    queues: HashMap<String, Queue>,
    sessions: HashMap<SessionId, Arc<AtomicBool>>,
    reachable: bool,
    stall_publishes: bool,
}

/// Shared handle to an in-process broker. Cloning yields another handle to
/// the same broker.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    dial_attempts: Arc<AtomicU32>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                queues: HashMap::new(),
                sessions: HashMap::new(),
                reachable: true,
                stall_publishes: false,
            })),
            dial_attempts: Arc::new(AtomicU32::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        // A poisoned lock only means a test thread panicked mid-update.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Creates `name` if it does not exist. Idempotent.
    pub fn declare_queue(&self, name: &str) {
        self.lock()
            .queues
            .entry(name.to_string())
            .or_insert_with(|| Queue::new(name));
    }

    pub fn has_queue(&self, name: &str) -> bool {
        self.lock().queues.contains_key(name)
    }

    /// Number of messages waiting in `name` for a consumer.
    pub fn backlog_len(&self, name: &str) -> usize {
        self.lock()
            .queues
            .get(name)
            .map_or(0, |q| q.backlog.len())
    }

    /// While false, every dial fails with [`TransportError::Unreachable`].
    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// While true, publishes never complete (a broker that stops responding).
    pub fn set_stall_publishes(&self, stall: bool) {
        self.lock().stall_publishes = stall;
    }

    /// Total dial attempts seen, successful or not.
    pub fn dial_attempts(&self) -> u32 {
        self.dial_attempts.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Broker-initiated close of every session, as on a broker restart.
    pub fn close_all_sessions(&self) {
        let ids: Vec<SessionId> = self.lock().sessions.keys().cloned().collect();
        for id in ids {
            self.cleanup_session(&id);
        }
    }

    fn register_session(&self) -> (SessionId, Arc<AtomicBool>) {
        let id = format!("session-{}", Uuid::new_v4());
        let open = Arc::new(AtomicBool::new(true));
        self.lock().sessions.insert(id.clone(), open.clone());
        (id, open)
    }

    fn publish(&self, msg: Message) {
        let mut state = self.lock();
        match state.queues.get_mut(&msg.routing_key) {
            Some(queue) => queue.deliver(msg),
            // mandatory=false: unroutable messages are dropped silently
            None => debug!(routing_key = %msg.routing_key, "no queue bound, message dropped"),
        }
    }

    fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
        session: &SessionId,
    ) -> Result<DeliveryStream, TransportError> {
        let mut state = self.lock();
        let Some(q) = state.queues.get_mut(queue) else {
            return Err(TransportError::QueueNotFound(queue.to_string()));
        };

        let (tx, rx) = mpsc::unbounded_channel();
        q.attach(Consumer {
            tag: consumer_tag.to_string(),
            session: session.clone(),
            sender: tx,
        });

        let deliveries = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (Ok(msg), rx))
        });
        Ok(deliveries.boxed())
    }

    /// Removes a session and unsubscribes its consumers from all queues.
    fn cleanup_session(&self, session: &SessionId) {
        let mut state = self.lock();
        if let Some(open) = state.sessions.remove(session) {
            open.store(false, Ordering::SeqCst);
        }
        for queue in state.queues.values_mut() {
            queue.detach_session(session);
        }
        debug!(session = %session, "cleaned up session");
    }
}

#[async_trait]
impl Dialer for MemoryBroker {
    async fn dial(&self, url: &str, label: &str) -> Result<Box<dyn Session>, TransportError> {
        self.dial_attempts.fetch_add(1, Ordering::SeqCst);
        if !self.lock().reachable {
            return Err(TransportError::Unreachable(format!("{url}: connection refused")));
        }

        let (id, open) = self.register_session();
        debug!(session = %id, label, "memory session opened");
        Ok(Box::new(MemorySession {
            id,
            open,
            broker: self.clone(),
        }))
    }
}

pub struct MemorySession {
    id: SessionId,
    open: Arc<AtomicBool>,
    broker: MemoryBroker,
}

impl MemorySession {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn publish(&self, message: &Message) -> Result<(), TransportError> {
        self.ensure_open()?;
        let stall = self.broker.lock().stall_publishes;
        if stall {
            std::future::pending::<()>().await;
        }
        self.broker.publish(message.clone());
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<DeliveryStream, TransportError> {
        self.ensure_open()?;
        match self.broker.consume(queue, consumer_tag, &self.id) {
            Ok(stream) => Ok(stream),
            Err(e) => {
                // Like AMQP's 404 channel exception: the channel does not survive.
                warn!(session = %self.id, queue, "consume on missing queue closes the channel");
                self.broker.cleanup_session(&self.id);
                Err(e)
            }
        }
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.broker.declare_queue(queue);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.broker.cleanup_session(&self.id);
        Ok(())
    }
}
