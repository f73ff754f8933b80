use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{BrokerError, MessageBroker, QueueHandle};
use crate::config::ServiceKind;

/// Task and user lifecycle events.
pub const TASK_QUEUE: &str = "task_queue";
/// Admin rendezvous tokens.
pub const ADMIN_QUEUE: &str = "admin_queue";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
}

impl QueueSpec {
    pub fn durable(name: &str) -> Self {
        Self {
            name: name.to_string(),
            durable: true,
        }
    }

    pub fn handle(&self) -> QueueHandle {
        QueueHandle {
            name: self.name.clone(),
            durable: self.durable,
        }
    }
}

/// Queues each service declares at startup.
pub fn queues_for(service: ServiceKind) -> Vec<QueueSpec> {
    match service {
        ServiceKind::Users => vec![QueueSpec::durable(TASK_QUEUE), QueueSpec::durable(ADMIN_QUEUE)],
        ServiceKind::Tasks => vec![QueueSpec::durable(TASK_QUEUE)],
        ServiceKind::Admin => vec![QueueSpec::durable(ADMIN_QUEUE)],
    }
}

/// Declares the queues used by `services`. Failures are logged and the remaining
/// queues are still attempted; the first error is returned.
pub async fn declare_topology(
    broker: &dyn MessageBroker,
    services: &[ServiceKind],
) -> Result<(), BrokerError> {
    let mut first_error = None;

    for service in services {
        for spec in queues_for(*service) {
            match broker.declare_queue(&spec).await {
                Ok(handle) => log::debug!("Queue {} declared (durable={})", handle.name, handle.durable),
                Err(e) => {
                    log::error!("Declaring queue {} failed: {}", spec.name, e);
                    first_error.get_or_insert(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Remembers the properties each queue was declared with.
#[derive(Debug, Default)]
pub struct QueueRegistry {
    declared: DashMap<String, QueueSpec>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Ok(true)` for a first declaration, `Ok(false)` for an identical
    /// redeclaration.
    pub fn register(&self, spec: &QueueSpec) -> Result<bool, BrokerError> {
        match self.declared.entry(spec.name.clone()) {
            Entry::Occupied(existing) if existing.get() == spec => Ok(false),
            Entry::Occupied(_) => Err(BrokerError::ConfigConflict {
                queue: spec.name.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(spec.clone());
                Ok(true)
            }
        }
    }

    /// Drops a registration whose declaration was rejected by the broker.
    pub fn forget(&self, name: &str) {
        self.declared.remove(name);
    }

    /// Every declaration made so far, for replaying onto a fresh connection.
    pub fn specs(&self) -> Vec<QueueSpec> {
        self.declared.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn ensure_declared(&self, name: &str) -> Result<(), BrokerError> {
        if self.declared.contains_key(name) {
            Ok(())
        } else {
            Err(BrokerError::QueueNotFound(name.to_string()))
        }
    }
}
