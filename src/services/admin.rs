//! Admin reads and the gate that guards them.
//!
//! Two gate modes exist:
//!
//! - `Capability`: the caller's bearer token must belong to an `admin` user.
//! - `Rendezvous`: the request waits for one message on `admin_queue` (published by an
//!   admin login) and treats its arrival as proof that an administrator is active. The
//!   wait is bounded; on timeout the request fails with "admin not active".
//!
//! ```text
//! WAIT_MESSAGE --(message arrives)--> PROCEED --(downstream query)--> RESPOND
//! WAIT_MESSAGE --(timeout)----------> REJECT (444)
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::broker::{MessageBroker, ADMIN_QUEUE};
use crate::error::AppError;
use crate::models::{NewServerStatus, ServerStatus, Task, UserRead};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminGateMode {
    Capability,
    Rendezvous,
}

/// A consumed and acknowledged admin-queue message. The body identifies the admin session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminApproval {
    pub token: String,
}

pub struct AdminGate {
    mode: AdminGateMode,
    broker: Arc<dyn MessageBroker>,
    wait: Duration,
}

impl AdminGate {
    pub fn new(mode: AdminGateMode, broker: Arc<dyn MessageBroker>, wait: Duration) -> Self {
        Self { mode, broker, wait }
    }

    pub fn mode(&self) -> AdminGateMode {
        self.mode
    }

    /// Waits up to the configured duration for a message on the admin queue, acknowledges
    /// it and returns its body. Cancelling the wait leaves any later message on the queue.
    pub async fn await_approval(&self) -> Result<AdminApproval, AppError> {
        let delivery = match tokio::time::timeout(self.wait, self.broker.consume_next(ADMIN_QUEUE))
            .await
        {
            Ok(received) => received?,
            Err(_) => {
                log::warn!("No admin message within {:?}", self.wait);
                return Err(AppError::AdminNotActive("Admin is not active".into()));
            }
        };

        self.broker.ack(&delivery).await?;
        log::info!("Admin approval received");
        Ok(AdminApproval {
            token: String::from_utf8_lossy(&delivery.body).into_owned(),
        })
    }

    /// Publishes an admin session token for a waiting reader. Only meaningful in rendezvous
    /// mode; a failed publish is logged.
    pub async fn announce(&self, token: &str) {
        if self.mode != AdminGateMode::Rendezvous {
            return;
        }
        match self.broker.publish(ADMIN_QUEUE, token.as_bytes()).await {
            Ok(()) => log::info!("Admin token published to {}", ADMIN_QUEUE),
            Err(e) => log::warn!("Admin token could not be published: {}", e),
        }
    }
}

/// Cross-user lookups, counts and statistics snapshots.
#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn Store>,
}

impl AdminService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn users_by_ids(&self, ids: &[i32]) -> Result<Vec<UserRead>, AppError> {
        let users = self.store.users_by_ids(ids).await?;
        if users.is_empty() {
            return Err(AppError::NotFound("No users found".into()));
        }
        Ok(users.into_iter().map(UserRead::from).collect())
    }

    pub async fn tasks_by_ids(&self, ids: &[i32]) -> Result<Vec<Task>, AppError> {
        let tasks = self.store.tasks_by_ids(ids).await?;
        if tasks.is_empty() {
            return Err(AppError::NotFound("No tasks found".into()));
        }
        Ok(tasks)
    }

    pub async fn count_users(&self) -> Result<i64, AppError> {
        Ok(self.store.count_users().await?)
    }

    pub async fn count_tasks(&self) -> Result<i64, AppError> {
        Ok(self.store.count_tasks().await?)
    }

    /// Stores a `server_status` row with the current user and task counts.
    pub async fn save_snapshot(&self) -> Result<ServerStatus, AppError> {
        let users_n = self.store.count_users().await?;
        let task_n = self.store.count_tasks().await?;
        let status = self
            .store
            .insert_status(NewServerStatus::from_counts(users_n, task_n, Utc::now()))
            .await?;
        log::info!(
            "Saved server status {}: {} users, {} tasks",
            status.id,
            status.users_n,
            status.task_n
        );
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{InMemoryBroker, QueueSpec, UnavailableBroker};
    use crate::models::{NewUser, Role, TaskInput};
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    async fn admin_broker() -> Arc<InMemoryBroker> {
        let broker = Arc::new(InMemoryBroker::new());
        broker.declare_queue(&QueueSpec::durable(ADMIN_QUEUE)).await.unwrap();
        broker
    }

    #[test_log::test(tokio::test)]
    async fn test_gate_times_out_without_admin() {
        let broker = admin_broker().await;
        let gate = AdminGate::new(
            AdminGateMode::Rendezvous,
            broker.clone(),
            Duration::from_millis(20),
        );

        assert!(matches!(
            gate.await_approval().await,
            Err(AppError::AdminNotActive(_))
        ));

        // The abandoned wait must not swallow a message published afterwards.
        gate.announce("late-token").await;
        assert_eq!(broker.ready_count(ADMIN_QUEUE).await, 1);
    }

    #[tokio::test]
    async fn test_gate_consumes_and_acks_one_message() {
        let broker = admin_broker().await;
        let gate = AdminGate::new(
            AdminGateMode::Rendezvous,
            broker.clone(),
            Duration::from_secs(1),
        );
        gate.announce("admin-token").await;

        let approval = gate.await_approval().await.unwrap();
        assert_eq!(approval.token, "admin-token");
        assert_eq!(broker.ready_count(ADMIN_QUEUE).await, 0);
        assert_eq!(broker.unacked_count(ADMIN_QUEUE).await, 0);
    }

    #[tokio::test]
    async fn test_capability_mode_never_publishes() {
        let broker = admin_broker().await;
        let gate = AdminGate::new(
            AdminGateMode::Capability,
            broker.clone(),
            Duration::from_secs(1),
        );
        gate.announce("admin-token").await;
        assert_eq!(broker.ready_count(ADMIN_QUEUE).await, 0);
    }

    #[test_log::test(tokio::test)]
    async fn test_gate_reports_unavailable_broker() {
        let gate = AdminGate::new(
            AdminGateMode::Rendezvous,
            Arc::new(UnavailableBroker),
            Duration::from_secs(1),
        );
        assert!(matches!(
            gate.await_approval().await,
            Err(AppError::ServiceUnavailable(_))
        ));
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for name in ["alice", "bob"] {
            store
                .insert_user(NewUser {
                    username: name.into(),
                    email: format!("{}@x.com", name),
                    password_hash: "hash".into(),
                    role: Role::User,
                })
                .await
                .unwrap();
        }
        let now = Utc::now();
        for (i, owner) in [1, 1, 2].into_iter().enumerate() {
            store
                .insert_task(
                    owner,
                    TaskInput {
                        name: format!("task-{}", i),
                        description: String::new(),
                        start_time: now,
                        finish_time: now,
                        checked: false,
                    },
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_lookup_by_ids() {
        let admin = AdminService::new(seeded_store().await);

        let users = admin.users_by_ids(&[2, 99]).await.unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].username, "bob");

        let tasks = admin.tasks_by_ids(&[1, 3]).await.unwrap();
        assert_eq!(tasks.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 3]);

        assert!(matches!(
            admin.users_by_ids(&[42]).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            admin.tasks_by_ids(&[]).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_counts_and_snapshot() {
        let store = seeded_store().await;
        let admin = AdminService::new(store.clone());

        assert_eq!(admin.count_users().await.unwrap(), 2);
        assert_eq!(admin.count_tasks().await.unwrap(), 3);

        let status = admin.save_snapshot().await.unwrap();
        assert_eq!(status.users_n, 2);
        assert_eq!(status.task_n, 3);
        assert_eq!(status.avg_task_n, 1.5);
        assert_eq!(store.statuses().await, vec![status]);
    }
}
