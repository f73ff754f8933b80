use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use super::{Store, StoreError};
use crate::models::{NewServerStatus, NewUser, ServerStatus, Task, TaskInput, TaskPatch, User};

const USER_COLUMNS: &str = "id, username, email, password, role";
const TASK_COLUMNS: &str = "id, name, description, start_time, finish_time, checked, user_id";

/// Postgres-backed store. Each call checks a connection out of the pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Applies the SQL migrations bundled under `migrations/`.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {}", e)))
    }
}

/// Commits on success; rolls back before surfacing the error otherwise.
async fn settle<T>(
    tx: Transaction<'_, Postgres>,
    result: Result<T, sqlx::Error>,
) -> Result<T, StoreError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = tx.rollback().await {
                log::error!("Rollback failed: {}", rollback_error);
            }
            Err(error.into())
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (username, email, password, role) VALUES ($1, $2, $3, $4) \
             RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role)
        .fetch_one(&mut *tx)
        .await;
        settle(tx, result).await
    }

    async fn users_by_ids(&self, ids: &[i32]) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ANY($1) ORDER BY id",
            USER_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn count_users(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert_task(&self, owner_id: i32, task: TaskInput) -> Result<Task, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO tasks (name, description, start_time, finish_time, checked, user_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(&task.name)
        .bind(&task.description)
        .bind(task.start_time)
        .bind(task.finish_time)
        .bind(task.checked)
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await;
        settle(tx, result).await
    }

    async fn tasks_by_owner(&self, owner_id: i32) -> Result<Vec<Task>, StoreError> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE user_id = $1 ORDER BY id",
            TASK_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    async fn update_task(
        &self,
        owner_id: i32,
        task_id: i32,
        patch: TaskPatch,
    ) -> Result<Task, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Fetch-and-check under a row lock before writing.
        let existing = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE id = $1 AND user_id = $2 FOR UPDATE",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await;

        let mut task = match existing {
            Ok(Some(task)) => task,
            Ok(None) => return settle(tx, Err(sqlx::Error::RowNotFound)).await,
            Err(e) => return settle(tx, Err(e)).await,
        };
        patch.apply(&mut task);

        let result = sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks SET name = $1, description = $2, start_time = $3, finish_time = $4, \
             checked = $5 WHERE id = $6 RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(&task.name)
        .bind(&task.description)
        .bind(task.start_time)
        .bind(task.finish_time)
        .bind(task.checked)
        .bind(task.id)
        .fetch_one(&mut *tx)
        .await;
        settle(tx, result).await
    }

    async fn delete_task(&self, owner_id: i32, task_id: i32) -> Result<Task, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query_as::<_, Task>(&format!(
            "DELETE FROM tasks WHERE id = $1 AND user_id = $2 RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await
        .and_then(|row| row.ok_or(sqlx::Error::RowNotFound));
        settle(tx, result).await
    }

    async fn tasks_by_ids(&self, ids: &[i32]) -> Result<Vec<Task>, StoreError> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {} FROM tasks WHERE id = ANY($1) ORDER BY id",
            TASK_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    async fn count_tasks(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tasks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn insert_status(&self, status: NewServerStatus) -> Result<ServerStatus, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query_as::<_, ServerStatus>(
            "INSERT INTO server_status (users_n, task_n, avg_task_n, captured_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, users_n, task_n, avg_task_n, captured_at",
        )
        .bind(status.users_n)
        .bind(status.task_n)
        .bind(status.avg_task_n)
        .bind(status.captured_at)
        .fetch_one(&mut *tx)
        .await;
        settle(tx, result).await
    }
}
