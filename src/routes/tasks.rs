use crate::{
    auth::AuthenticatedUser,
    error::AppError,
    models::{TaskInput, TaskPatch},
    services::TaskService,
};
use actix_web::{delete, get, patch, post, web, HttpResponse, Responder};
use serde_json::json;

/// Lists the caller's tasks, ordered by id.
#[get("")]
pub async fn list_tasks(
    tasks: web::Data<TaskService>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    let tasks = tasks.list(&user.0).await?;
    Ok(HttpResponse::Ok().json(tasks))
}

/// Creates a new task owned by the caller.
///
/// ## Responses:
/// - `201 Created`: the stored `Task`.
/// - `400 Bad Request`: malformed JSON, or a task with the same name already exists.
/// - `401 Unauthorized`: missing, expired or revoked token.
/// - `422 Unprocessable Entity`: name empty or longer than 255 characters.
#[post("")]
pub async fn create_task(
    tasks: web::Data<TaskService>,
    user: AuthenticatedUser,
    payload: web::Json<TaskInput>,
) -> Result<impl Responder, AppError> {
    let task = tasks.create(&user.0, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(task))
}

/// Partially updates a task. Fields absent from the body are left unchanged.
///
/// A task that does not exist or belongs to someone else is `404 Not Found`.
#[patch("/{id}")]
pub async fn patch_task(
    tasks: web::Data<TaskService>,
    user: AuthenticatedUser,
    task_id: web::Path<i32>,
    payload: web::Json<TaskPatch>,
) -> Result<impl Responder, AppError> {
    let task = tasks
        .patch(&user.0, task_id.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(task))
}

#[delete("/{id}")]
pub async fn delete_task(
    tasks: web::Data<TaskService>,
    user: AuthenticatedUser,
    task_id: web::Path<i32>,
) -> Result<impl Responder, AppError> {
    let task = tasks.delete(&user.0, task_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "message": "Task deleted",
        "task_id": task.id
    })))
}
