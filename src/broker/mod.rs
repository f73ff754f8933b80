//! # Message broker
//!
//! Services talk to the broker only through the [`MessageBroker`] trait. The process
//! holds one broker handle (`Arc<dyn MessageBroker>`) that is shared by every in-flight
//! request; implementations must tolerate concurrent publishes.
//!
//! - [`AmqpBroker`] speaks AMQP 0.9.1 to RabbitMQ through `lapin`.
//! - [`InMemoryBroker`] keeps queues in process, for tests and local development.
//! - [`UnavailableBroker`] stands in when the connection could not be established and
//!   rejects every operation with [`BrokerError::Unavailable`].

pub mod amqp;
pub mod connection;
pub mod events;
pub mod memory;
pub mod topology;

use async_trait::async_trait;
use thiserror::Error;

pub use amqp::AmqpBroker;
pub use connection::{connect_with_retry, establish, RetryPolicy, UnavailableBroker};
pub use events::{Event, EventPublisher};
pub use memory::InMemoryBroker;
pub use topology::{declare_topology, QueueSpec, ADMIN_QUEUE, TASK_QUEUE};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("broker transport unavailable")]
    Unavailable,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("queue {queue} already declared with different properties")]
    ConfigConflict { queue: String },

    #[error("queue {0} has not been declared")]
    QueueNotFound(String),

    #[error("publish to {queue} failed: {message}")]
    Publish { queue: String, message: String },

    #[error("consume from {queue} failed: {message}")]
    Consume { queue: String, message: String },
}

/// Returned by a successful declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    pub name: String,
    pub durable: bool,
}

/// A message taken off a queue. It stays unacknowledged until passed to
/// [`MessageBroker::ack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub queue: String,
    pub tag: u64,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait MessageBroker: Send + Sync + 'static {
    /// Declares a queue. Redeclaring with identical properties is a no-op; different
    /// properties fail with [`BrokerError::ConfigConflict`].
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<QueueHandle, BrokerError>;

    /// Publishes `payload` to `queue` with persistent delivery.
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError>;

    /// Waits until a message is available on `queue` and takes it.
    ///
    /// Dropping the returned future before it completes must not lose a message.
    async fn consume_next(&self, queue: &str) -> Result<Delivery, BrokerError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError>;

    /// Releases the underlying connection. Later calls fail with `Unavailable`.
    async fn close(&self) -> Result<(), BrokerError>;
}
