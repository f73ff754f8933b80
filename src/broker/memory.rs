//! # In-Memory Broker
//!
//! Process-local queues with the same declaration, publish, consume and ack semantics as
//! the AMQP broker. Used by the test suite and for running a single process without
//! RabbitMQ.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::topology::{QueueRegistry, QueueSpec};
use super::{BrokerError, Delivery, MessageBroker, QueueHandle};

#[derive(Debug, Default)]
struct MemoryQueue {
    ready: VecDeque<Vec<u8>>,
    unacked: HashMap<u64, Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct InMemoryBroker {
    registry: QueueRegistry,
    queues: Mutex<HashMap<String, MemoryQueue>>,
    arrivals: Notify,
    next_tag: AtomicU64,
    closed: AtomicBool,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(BrokerError::Unavailable)
        } else {
            Ok(())
        }
    }

    /// Messages waiting to be consumed.
    pub async fn ready_count(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|q| q.ready.len())
            .unwrap_or(0)
    }

    /// Messages handed to a consumer but not acknowledged yet.
    pub async fn unacked_count(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|q| q.unacked.len())
            .unwrap_or(0)
    }

    /// Removes and returns every waiting message body, oldest first.
    pub async fn drain(&self, queue: &str) -> Vec<Vec<u8>> {
        self.queues
            .lock()
            .await
            .get_mut(queue)
            .map(|q| q.ready.drain(..).collect())
            .unwrap_or_default()
    }

    async fn try_take(&self, queue: &str) -> Result<Option<Delivery>, BrokerError> {
        let mut queues = self.queues.lock().await;
        let state = queues
            .get_mut(queue)
            .ok_or_else(|| BrokerError::QueueNotFound(queue.to_string()))?;

        Ok(state.ready.pop_front().map(|body| {
            let tag = self.next_tag.fetch_add(1, Ordering::SeqCst) + 1;
            state.unacked.insert(tag, body.clone());
            Delivery {
                queue: queue.to_string(),
                tag,
                body,
            }
        }))
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<QueueHandle, BrokerError> {
        self.check_open()?;
        if self.registry.register(spec)? {
            self.queues
                .lock()
                .await
                .entry(spec.name.clone())
                .or_default();
        }
        Ok(spec.handle())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.check_open()?;
        self.registry.ensure_declared(queue)?;
        {
            let mut queues = self.queues.lock().await;
            queues
                .entry(queue.to_string())
                .or_default()
                .ready
                .push_back(payload.to_vec());
        }
        self.arrivals.notify_waiters();
        Ok(())
    }

    async fn consume_next(&self, queue: &str) -> Result<Delivery, BrokerError> {
        loop {
            // Registered before checking so a publish in between still wakes us.
            let arrived = self.arrivals.notified();
            self.check_open()?;
            if let Some(delivery) = self.try_take(queue).await? {
                return Ok(delivery);
            }
            arrived.await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.check_open()?;
        let mut queues = self.queues.lock().await;
        queues
            .get_mut(&delivery.queue)
            .and_then(|q| q.unacked.remove(&delivery.tag))
            .map(|_| ())
            .ok_or_else(|| BrokerError::Consume {
                queue: delivery.queue.clone(),
                message: format!("unknown delivery tag {}", delivery.tag),
            })
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.closed.store(true, Ordering::SeqCst);
        self.arrivals.notify_waiters();
        Ok(())
    }
}
