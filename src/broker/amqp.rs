//! # RabbitMQ broker
//!
//! AMQP 0.9.1 implementation of [`MessageBroker`] using `lapin`.
//!
//! - Queues are declared on the default exchange; the routing key is the queue name.
//! - Messages are published with delivery mode 2 (persistent) and the publish waits for
//!   the broker's confirmation.
//! - Consumption polls `basic.get` on a spawned task. A message that arrives after the
//!   caller stopped waiting is nacked with requeue, so a cancelled wait never strands it.
//! - The connection is supervised: once it drops, the next operation reopens it and
//!   replays the queue declarations made so far.
//! - A lapin `Channel` is safe to share, so concurrent publishes need no extra locking.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lapin::options::{
    BasicAckOptions, BasicGetOptions, BasicNackOptions, BasicPublishOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::oneshot;

use super::connection::{Connector, RetryPolicy, Supervisor};
use super::topology::{QueueRegistry, QueueSpec};
use super::{BrokerError, Delivery, MessageBroker, QueueHandle};

const PERSISTENT: u8 = 2;
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// One attempt per operation; the caller is an HTTP request.
const RECONNECT: RetryPolicy = RetryPolicy {
    max_attempts: 1,
    delay: Duration::from_millis(0),
};

#[derive(Clone)]
struct AmqpLink {
    connection: Arc<Connection>,
    channel: Channel,
}

struct AmqpConnector {
    url: String,
    registry: Arc<QueueRegistry>,
}

#[async_trait]
impl Connector for AmqpConnector {
    type Link = AmqpLink;

    async fn open(&self) -> Result<AmqpLink, BrokerError> {
        let connection = Connection::connect(
            &self.url,
            ConnectionProperties::default().with_connection_name("taskrelay".into()),
        )
        .await
        .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connection(format!("channel creation failed: {}", e)))?;

        for spec in self.registry.specs() {
            declare(&channel, &spec).await?;
        }

        Ok(AmqpLink {
            connection: Arc::new(connection),
            channel,
        })
    }

    fn is_open(link: &AmqpLink) -> bool {
        link.connection.status().connected() && link.channel.status().connected()
    }
}

async fn declare(channel: &Channel, spec: &QueueSpec) -> Result<(), BrokerError> {
    channel
        .queue_declare(
            &spec.name,
            QueueDeclareOptions {
                durable: spec.durable,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map(|_| log::info!("Declared queue {} (durable={})", spec.name, spec.durable))
        .map_err(|e| BrokerError::Connection(format!("declaring {} failed: {}", spec.name, e)))
}

/// Runs `work` to completion on its own task. If the caller stops waiting first, the
/// output is handed to `abandoned` instead of being dropped. `None` means the task died.
async fn detached<T, W, A, AF>(work: W, abandoned: A) -> Option<T>
where
    T: Send + 'static,
    W: Future<Output = T> + Send + 'static,
    A: FnOnce(T) -> AF + Send + 'static,
    AF: Future<Output = ()> + Send,
{
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let output = work.await;
        if let Err(output) = tx.send(output) {
            abandoned(output).await;
        }
    });
    rx.await.ok()
}

pub struct AmqpBroker {
    supervisor: Supervisor<AmqpConnector>,
    registry: Arc<QueueRegistry>,
    closed: AtomicBool,
}

impl std::fmt::Debug for AmqpBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpBroker")
            .field("queues", &self.registry.specs())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl AmqpBroker {
    /// Connects under `policy`, failing with `Unavailable` once it is spent.
    pub async fn connect(url: &str, policy: &RetryPolicy) -> Result<Self, BrokerError> {
        let registry = Arc::new(QueueRegistry::new());
        let connector = AmqpConnector {
            url: url.to_string(),
            registry: Arc::clone(&registry),
        };

        Ok(Self {
            supervisor: Supervisor::start(connector, policy, RECONNECT).await?,
            registry,
            closed: AtomicBool::new(false),
        })
    }

    async fn link(&self) -> Result<AmqpLink, BrokerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BrokerError::Unavailable);
        }
        self.supervisor.link().await
    }

    async fn poll_once(&self, queue: &str) -> Result<Option<Delivery>, BrokerError> {
        let consume_error = |message: String| BrokerError::Consume {
            queue: queue.to_string(),
            message,
        };

        let channel = self.link().await?.channel;
        let requeue_channel = channel.clone();
        let name = queue.to_string();

        let polled = detached(
            async move { channel.basic_get(&name, BasicGetOptions { no_ack: false }).await },
            move |polled| async move {
                if let Ok(Some(message)) = polled {
                    let tag = message.delivery.delivery_tag;
                    let requeue = BasicNackOptions {
                        multiple: false,
                        requeue: true,
                    };
                    match requeue_channel.basic_nack(tag, requeue).await {
                        Ok(()) => log::info!("Requeued message {} after an abandoned wait", tag),
                        Err(e) => log::warn!("Requeue of message {} failed: {}", tag, e),
                    }
                }
            },
        )
        .await
        .ok_or_else(|| consume_error("poll task ended".into()))?
        .map_err(|e| consume_error(e.to_string()))?;

        Ok(polled.map(|message| Delivery {
            queue: queue.to_string(),
            tag: message.delivery.delivery_tag,
            body: message.delivery.data,
        }))
    }
}

#[async_trait]
impl MessageBroker for AmqpBroker {
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<QueueHandle, BrokerError> {
        let link = self.link().await?;
        // A conflicting declaration is caught locally: RabbitMQ would answer with
        // PRECONDITION_FAILED and close the shared channel.
        if !self.registry.register(spec)? {
            return Ok(spec.handle());
        }

        if let Err(e) = declare(&link.channel, spec).await {
            self.registry.forget(&spec.name);
            return Err(e);
        }
        Ok(spec.handle())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        self.registry.ensure_declared(queue)?;
        let link = self.link().await?;

        let publish_error = |e: lapin::Error| BrokerError::Publish {
            queue: queue.to_string(),
            message: e.to_string(),
        };

        link.channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(PERSISTENT),
            )
            .await
            .map_err(publish_error)?
            .await
            .map_err(publish_error)?;

        Ok(())
    }

    async fn consume_next(&self, queue: &str) -> Result<Delivery, BrokerError> {
        loop {
            if let Some(delivery) = self.poll_once(queue).await? {
                return Ok(delivery);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        self.link()
            .await?
            .channel
            .basic_ack(delivery.tag, BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::Consume {
                queue: delivery.queue.clone(),
                message: format!("ack failed: {}", e),
            })
    }

    async fn close(&self) -> Result<(), BrokerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(link) = self.supervisor.take().await {
            link.connection
                .close(200, "shutdown")
                .await
                .map_err(|e| BrokerError::Connection(format!("close failed: {}", e)))?;
        }
        log::info!("Message broker connection closed");
        Ok(())
    }
}
