use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Input structure for creating a task.
///
/// The owner is never part of the payload; it is taken from the authenticated caller.
/// `start_time` after `finish_time` is accepted as-is.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TaskInput {
    /// The unique name of the task.
    /// Must be between 1 and 255 characters.
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    /// Free-form description.
    pub description: String,

    /// When work on the task starts.
    pub start_time: DateTime<Utc>,

    /// When work on the task is due to finish.
    pub finish_time: DateTime<Utc>,

    /// Whether the task is done.
    #[serde(default)]
    pub checked: bool,
}

/// Partial update of a task. Only fields that are present are applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TaskPatch {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    pub checked: Option<bool>,
}

/// Represents a task entity as stored in the database and returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub finish_time: DateTime<Utc>,
    pub checked: bool,
    /// Identifier of the user who owns the task.
    pub user_id: i32,
}

impl TaskPatch {
    /// Applies the present fields to `task`, leaving the rest untouched.
    pub fn apply(self, task: &mut Task) {
        if let Some(name) = self.name {
            task.name = name;
        }
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(start_time) = self.start_time {
            task.start_time = start_time;
        }
        if let Some(finish_time) = self.finish_time {
            task.finish_time = finish_time;
        }
        if let Some(checked) = self.checked {
            task.checked = checked;
        }
    }
}
