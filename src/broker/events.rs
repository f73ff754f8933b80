use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::MessageBroker;

/// Lifecycle notifications published to the task queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    UserRegistered { user_id: i32 },
    UserLoggedIn { user_id: i32 },
    UserLoggedOut { user_id: i32 },
    TaskCreated { task_id: i32, user_id: i32 },
    TaskDeleted { task_id: i32, user_id: i32 },
}

/// Best-effort publisher. A failed publish is logged and never fails the operation that
/// triggered it.
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn MessageBroker>,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self { broker }
    }

    pub async fn notify(&self, queue: &str, event: &Event) {
        match serde_json::to_vec(event) {
            Ok(payload) => self.publish_raw(queue, &payload).await,
            Err(e) => log::error!("Failed to serialize event {:?}: {}", event, e),
        }
    }

    pub async fn publish_raw(&self, queue: &str, payload: &[u8]) {
        if let Err(e) = self.broker.publish(queue, payload).await {
            log::warn!("Dropping message for {}: {}", queue, e);
        }
    }
}
