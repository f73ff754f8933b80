use std::sync::Arc;

use validator::Validate;

use crate::broker::{Event, EventPublisher, TASK_QUEUE};
use crate::error::AppError;
use crate::models::{Task, TaskInput, TaskPatch, User};
use crate::store::{Store, StoreError};

/// Task lifecycle for the authenticated owner. The owner always comes from the caller's
/// identity, never from the payload.
#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn Store>,
    events: EventPublisher,
}

fn task_error(error: StoreError) -> AppError {
    match error {
        StoreError::NotFound => AppError::NotFound("Task not found".into()),
        StoreError::UniqueViolation(_) => {
            AppError::Conflict("Task name is already in use".into())
        }
        other => other.into(),
    }
}

impl TaskService {
    pub fn new(store: Arc<dyn Store>, events: EventPublisher) -> Self {
        Self { store, events }
    }

    pub async fn create(&self, owner: &User, input: TaskInput) -> Result<Task, AppError> {
        input.validate()?;

        let task = self
            .store
            .insert_task(owner.id, input)
            .await
            .map_err(task_error)?;
        log::info!("User {} created task {}", owner.id, task.id);

        self.events
            .notify(
                TASK_QUEUE,
                &Event::TaskCreated {
                    task_id: task.id,
                    user_id: owner.id,
                },
            )
            .await;
        Ok(task)
    }

    pub async fn list(&self, owner: &User) -> Result<Vec<Task>, AppError> {
        Ok(self.store.tasks_by_owner(owner.id).await?)
    }

    /// Applies only the fields present in `patch`.
    pub async fn patch(
        &self,
        owner: &User,
        task_id: i32,
        patch: TaskPatch,
    ) -> Result<Task, AppError> {
        patch.validate()?;
        self.store
            .update_task(owner.id, task_id, patch)
            .await
            .map_err(task_error)
    }

    pub async fn delete(&self, owner: &User, task_id: i32) -> Result<Task, AppError> {
        let task = self
            .store
            .delete_task(owner.id, task_id)
            .await
            .map_err(task_error)?;
        log::info!("User {} deleted task {}", owner.id, task.id);

        self.events
            .notify(
                TASK_QUEUE,
                &Event::TaskDeleted {
                    task_id: task.id,
                    user_id: owner.id,
                },
            )
            .await;
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{InMemoryBroker, MessageBroker, QueueSpec, UnavailableBroker};
    use crate::models::{NewUser, Role};
    use crate::store::MemoryStore;
    use chrono::{Duration, Utc};
    use pretty_assertions::assert_eq;

    async fn owner(store: &MemoryStore, name: &str) -> User {
        store
            .insert_user(NewUser {
                username: name.into(),
                email: format!("{}@x.com", name),
                password_hash: "hash".into(),
                role: Role::User,
            })
            .await
            .unwrap()
    }

    fn input(name: &str) -> TaskInput {
        let now = Utc::now();
        TaskInput {
            name: name.into(),
            description: "desc".into(),
            start_time: now,
            finish_time: now + Duration::hours(1),
            checked: false,
        }
    }

    async fn setup() -> (TaskService, Arc<MemoryStore>, Arc<InMemoryBroker>) {
        let store = Arc::new(MemoryStore::new());
        let broker = Arc::new(InMemoryBroker::new());
        broker.declare_queue(&QueueSpec::durable(TASK_QUEUE)).await.unwrap();
        let service = TaskService::new(store.clone(), EventPublisher::new(broker.clone()));
        (service, store, broker)
    }

    #[tokio::test]
    async fn test_create_then_list_contains_task_once() {
        let (service, store, _) = setup().await;
        let alice = owner(&store, "alice").await;

        let created = service.create(&alice, input("Write report")).await.unwrap();
        let listed = service.list(&alice).await.unwrap();

        assert_eq!(listed, vec![created.clone()]);
        assert_eq!(created.user_id, alice.id);
    }

    #[tokio::test]
    async fn test_patch_checked_only_leaves_other_fields() {
        let (service, store, _) = setup().await;
        let alice = owner(&store, "alice").await;
        let created = service.create(&alice, input("Write report")).await.unwrap();

        let patched = service
            .patch(
                &alice,
                created.id,
                TaskPatch {
                    checked: Some(true),
                    ..TaskPatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(
            patched,
            Task {
                checked: true,
                ..created
            }
        );
    }

    #[tokio::test]
    async fn test_delete_then_patch_is_not_found() {
        let (service, store, _) = setup().await;
        let alice = owner(&store, "alice").await;
        let created = service.create(&alice, input("Write report")).await.unwrap();

        service.delete(&alice, created.id).await.unwrap();
        let result = service
            .patch(&alice, created.id, TaskPatch::default())
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert!(matches!(
            service.delete(&alice, created.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_task_name_conflicts() {
        let (service, store, _) = setup().await;
        let alice = owner(&store, "alice").await;
        service.create(&alice, input("Write report")).await.unwrap();

        assert!(matches!(
            service.create(&alice, input("Write report")).await,
            Err(AppError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_create_and_delete_publish_events() {
        let (service, store, broker) = setup().await;
        let alice = owner(&store, "alice").await;
        let created = service.create(&alice, input("Write report")).await.unwrap();
        service.delete(&alice, created.id).await.unwrap();

        let events: Vec<Event> = broker
            .drain(TASK_QUEUE)
            .await
            .iter()
            .map(|body| serde_json::from_slice(body).unwrap())
            .collect();
        assert_eq!(
            events,
            vec![
                Event::TaskCreated {
                    task_id: created.id,
                    user_id: alice.id
                },
                Event::TaskDeleted {
                    task_id: created.id,
                    user_id: alice.id
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_fail_create() {
        let store = Arc::new(MemoryStore::new());
        let service = TaskService::new(
            store.clone(),
            EventPublisher::new(Arc::new(UnavailableBroker)),
        );
        let alice = owner(&store, "alice").await;

        assert!(service.create(&alice, input("Offline")).await.is_ok());
        assert_eq!(service.list(&alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_no_task() {
        let (service, store, broker) = setup().await;
        let alice = owner(&store, "alice").await;
        store.fail_writes(true);

        assert!(matches!(
            service.create(&alice, input("Doomed")).await,
            Err(AppError::DatabaseError(_))
        ));
        store.fail_writes(false);
        assert!(service.list(&alice).await.unwrap().is_empty());
        assert_eq!(broker.ready_count(TASK_QUEUE).await, 0);
    }
}
