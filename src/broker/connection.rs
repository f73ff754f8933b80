//! Broker connection management: bounded retries with a fixed delay, then either a live
//! broker or a stand-in that rejects every operation. A live connection is supervised
//! and reopened on demand after it drops.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::topology::QueueSpec;
use super::{AmqpBroker, BrokerError, Delivery, MessageBroker, QueueHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

/// Calls `connect` until it succeeds or `policy.max_attempts` calls have failed,
/// sleeping `policy.delay` between failures. The attempt number (1-based) is passed in.
pub async fn connect_with_retry<B, F, Fut>(policy: &RetryPolicy, mut connect: F) -> Option<B>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<B, BrokerError>>,
{
    for attempt in 1..=policy.max_attempts {
        match connect(attempt).await {
            Ok(broker) => {
                log::info!("Connected to message broker on attempt {}", attempt);
                return Some(broker);
            }
            Err(e) => {
                log::warn!("Broker connection attempt {} failed: {}", attempt, e);
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }

    log::error!(
        "Could not connect to message broker after {} attempts; continuing without it",
        policy.max_attempts
    );
    None
}

/// Connects to the AMQP broker at `url`, falling back to [`UnavailableBroker`] once the
/// retry budget is spent.
pub async fn establish(url: &str, policy: &RetryPolicy) -> Arc<dyn MessageBroker> {
    match AmqpBroker::connect(url, policy).await {
        Ok(broker) => Arc::new(broker),
        Err(_) => Arc::new(UnavailableBroker),
    }
}

/// Opens links (a connection and whatever hangs off it) to a broker.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Link: Clone + Send + Sync;

    async fn open(&self) -> Result<Self::Link, BrokerError>;

    /// False once the link was closed by either side.
    fn is_open(link: &Self::Link) -> bool;
}

/// Keeps one live link and replaces it when it is found closed.
///
/// Reopening happens on the next call to [`Supervisor::link`], under a lock, so
/// concurrent callers share a single reconnect.
pub struct Supervisor<C: Connector> {
    connector: C,
    reconnect: RetryPolicy,
    current: Mutex<Option<C::Link>>,
}

impl<C: Connector> Supervisor<C> {
    /// Opens the first link under `startup`. Later reconnects use `reconnect`, which
    /// should be short since a request is waiting on it.
    pub async fn start(
        connector: C,
        startup: &RetryPolicy,
        reconnect: RetryPolicy,
    ) -> Result<Self, BrokerError> {
        let link = connect_with_retry(startup, |_| connector.open())
            .await
            .ok_or(BrokerError::Unavailable)?;

        Ok(Self {
            connector,
            reconnect,
            current: Mutex::new(Some(link)),
        })
    }

    pub async fn link(&self) -> Result<C::Link, BrokerError> {
        let mut current = self.current.lock().await;
        if let Some(link) = current.as_ref().filter(|link| C::is_open(link)) {
            return Ok(link.clone());
        }
        if current.take().is_some() {
            log::warn!("Message broker connection lost, reconnecting");
        }

        let link = connect_with_retry(&self.reconnect, |_| self.connector.open())
            .await
            .ok_or(BrokerError::Unavailable)?;
        *current = Some(link.clone());
        Ok(link)
    }

    /// Removes the current link so it can be closed. No link is reopened afterwards unless
    /// [`Supervisor::link`] is called again.
    pub async fn take(&self) -> Option<C::Link> {
        self.current.lock().await.take()
    }
}

/// Broker used when no connection could be made.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableBroker;

#[async_trait]
impl MessageBroker for UnavailableBroker {
    async fn declare_queue(&self, _spec: &QueueSpec) -> Result<QueueHandle, BrokerError> {
        Err(BrokerError::Unavailable)
    }

    async fn publish(&self, _queue: &str, _payload: &[u8]) -> Result<(), BrokerError> {
        Err(BrokerError::Unavailable)
    }

    async fn consume_next(&self, _queue: &str) -> Result<Delivery, BrokerError> {
        Err(BrokerError::Unavailable)
    }

    async fn ack(&self, _delivery: &Delivery) -> Result<(), BrokerError> {
        Err(BrokerError::Unavailable)
    }

    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}
