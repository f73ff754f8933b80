use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Store, StoreError};
use crate::models::{NewServerStatus, NewUser, ServerStatus, Task, TaskInput, TaskPatch, User};

#[derive(Debug, Default, Clone)]
struct Tables {
    users: BTreeMap<i32, User>,
    tasks: BTreeMap<i32, Task>,
    statuses: Vec<ServerStatus>,
    next_user_id: i32,
    next_task_id: i32,
    next_status_id: i32,
}

impl Tables {
    fn next_id(counter: &mut i32) -> i32 {
        *counter += 1;
        *counter
    }
}

/// In-memory store with the same constraints as the SQL schema.
///
/// Mutating calls run against a staged copy of the tables that replaces the live ones
/// only on commit, so a call that fails after a tentative write leaves nothing behind.
/// `fail_writes` makes every commit fail with a database error, after the call's changes
/// were staged.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn statuses(&self) -> Vec<ServerStatus> {
        self.tables.read().await.statuses.clone()
    }

    /// Applies `write` to a copy of the tables and commits the copy if `write` and the
    /// commit both succeed. The write lock is held throughout.
    async fn transact<T, W>(&self, write: W) -> Result<T, StoreError>
    where
        W: FnOnce(&mut Tables) -> Result<T, StoreError>,
    {
        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();

        let value = write(&mut staged)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database("simulated commit failure".into()));
        }

        *tables = staged;
        Ok(value)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.transact(|tables| {
            if tables.users.values().any(|u| u.username == user.username) {
                return Err(StoreError::UniqueViolation(Some("users_username_key".into())));
            }
            if tables.users.values().any(|u| u.email == user.email) {
                return Err(StoreError::UniqueViolation(Some("users_email_key".into())));
            }

            let id = Tables::next_id(&mut tables.next_user_id);
            let stored = User {
                id,
                username: user.username,
                email: user.email,
                password_hash: user.password_hash,
                role: user.role,
            };
            tables.users.insert(id, stored.clone());
            Ok(stored)
        })
        .await
    }

    async fn users_by_ids(&self, ids: &[i32]) -> Result<Vec<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn count_users(&self) -> Result<i64, StoreError> {
        Ok(self.tables.read().await.users.len() as i64)
    }

    async fn insert_task(&self, owner_id: i32, task: TaskInput) -> Result<Task, StoreError> {
        self.transact(|tables| {
            if !tables.users.contains_key(&owner_id) {
                return Err(StoreError::ForeignKeyViolation(Some("tasks_user_id_fkey".into())));
            }
            if tables.tasks.values().any(|t| t.name == task.name) {
                return Err(StoreError::UniqueViolation(Some("tasks_name_key".into())));
            }

            let id = Tables::next_id(&mut tables.next_task_id);
            let stored = Task {
                id,
                name: task.name,
                description: task.description,
                start_time: task.start_time,
                finish_time: task.finish_time,
                checked: task.checked,
                user_id: owner_id,
            };
            tables.tasks.insert(id, stored.clone());
            Ok(stored)
        })
        .await
    }

    async fn tasks_by_owner(&self, owner_id: i32) -> Result<Vec<Task>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .tasks
            .values()
            .filter(|t| t.user_id == owner_id)
            .cloned()
            .collect())
    }

    async fn update_task(
        &self,
        owner_id: i32,
        task_id: i32,
        patch: TaskPatch,
    ) -> Result<Task, StoreError> {
        self.transact(|tables| {
            let task = match tables.tasks.get_mut(&task_id) {
                Some(task) if task.user_id == owner_id => task,
                _ => return Err(StoreError::NotFound),
            };
            patch.apply(task);
            let updated = task.clone();

            // Checked after the tentative write, as the unique index would be.
            if tables
                .tasks
                .values()
                .any(|t| t.id != task_id && t.name == updated.name)
            {
                return Err(StoreError::UniqueViolation(Some("tasks_name_key".into())));
            }
            Ok(updated)
        })
        .await
    }

    async fn delete_task(&self, owner_id: i32, task_id: i32) -> Result<Task, StoreError> {
        self.transact(|tables| {
            match tables.tasks.get(&task_id) {
                Some(task) if task.user_id == owner_id => {}
                _ => return Err(StoreError::NotFound),
            }
            tables.tasks.remove(&task_id).ok_or(StoreError::NotFound)
        })
        .await
    }

    async fn tasks_by_ids(&self, ids: &[i32]) -> Result<Vec<Task>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .tasks
            .values()
            .filter(|t| ids.contains(&t.id))
            .cloned()
            .collect())
    }

    async fn count_tasks(&self) -> Result<i64, StoreError> {
        Ok(self.tables.read().await.tasks.len() as i64)
    }

    async fn insert_status(&self, status: NewServerStatus) -> Result<ServerStatus, StoreError> {
        self.transact(|tables| {
            let id = Tables::next_id(&mut tables.next_status_id);
            let stored = ServerStatus {
                id,
                users_n: status.users_n,
                task_n: status.task_n,
                avg_task_n: status.avg_task_n,
                captured_at: status.captured_at,
            };
            tables.statuses.push(stored.clone());
            Ok(stored)
        })
        .await
    }
}
