//! Relational store interface.
//!
//! Every operation acquires its own connection (or lock) for the duration of the call and
//! releases it on every path. Mutating operations run inside a transaction; a failure
//! after a tentative write rolls the transaction back before the error is returned, so
//! no partial write is ever visible to later reads.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{NewServerStatus, NewUser, ServerStatus, Task, TaskInput, TaskPatch, User};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// Carries the violated constraint name when the backend reports it.
    #[error("unique constraint violated: {0:?}")]
    UniqueViolation(Option<String>),

    #[error("foreign key constraint violated: {0:?}")]
    ForeignKeyViolation(Option<String>),

    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// True when a unique violation names a constraint containing `column`.
    pub fn violates(&self, column: &str) -> bool {
        matches!(self, StoreError::UniqueViolation(Some(name)) if name.contains(column))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> StoreError {
        match error {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) => {
                let constraint = db.constraint().map(str::to_string);
                match db.code().as_deref() {
                    Some("23505") => StoreError::UniqueViolation(constraint),
                    Some("23503") => StoreError::ForeignKeyViolation(constraint),
                    _ => StoreError::Database(db.to_string()),
                }
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn users_by_ids(&self, ids: &[i32]) -> Result<Vec<User>, StoreError>;

    async fn count_users(&self) -> Result<i64, StoreError>;

    async fn insert_task(&self, owner_id: i32, task: TaskInput) -> Result<Task, StoreError>;

    /// Tasks owned by `owner_id`, ordered by id.
    async fn tasks_by_owner(&self, owner_id: i32) -> Result<Vec<Task>, StoreError>;

    /// Applies `patch` to a task owned by `owner_id`.
    /// A missing task, or one owned by someone else, is `NotFound`.
    async fn update_task(
        &self,
        owner_id: i32,
        task_id: i32,
        patch: TaskPatch,
    ) -> Result<Task, StoreError>;

    /// Deletes a task owned by `owner_id` and returns the removed row.
    async fn delete_task(&self, owner_id: i32, task_id: i32) -> Result<Task, StoreError>;

    async fn tasks_by_ids(&self, ids: &[i32]) -> Result<Vec<Task>, StoreError>;

    async fn count_tasks(&self) -> Result<i64, StoreError>;

    async fn insert_status(&self, status: NewServerStatus) -> Result<ServerStatus, StoreError>;
}
