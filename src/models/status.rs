use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Point-in-time aggregate of the platform, stored in `server_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ServerStatus {
    pub id: i32,
    pub users_n: i64,
    pub task_n: i64,
    pub avg_task_n: f64,
    pub captured_at: DateTime<Utc>,
}

/// A snapshot that has been computed but not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewServerStatus {
    pub users_n: i64,
    pub task_n: i64,
    pub avg_task_n: f64,
    pub captured_at: DateTime<Utc>,
}

impl NewServerStatus {
    /// Builds a snapshot from raw counts. With no users the average is zero.
    pub fn from_counts(users_n: i64, task_n: i64, captured_at: DateTime<Utc>) -> Self {
        let avg_task_n = if users_n > 0 {
            task_n as f64 / users_n as f64
        } else {
            0.0
        };

        Self {
            users_n,
            task_n,
            avg_task_n,
            captured_at,
        }
    }
}
