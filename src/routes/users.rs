use crate::{
    auth::{
        AuthError, AuthenticatedUser, BearerToken, CredentialService, LoginRequest,
        RegisterRequest, TokenResponse,
    },
    broker::{Event, EventPublisher, TASK_QUEUE},
    error::AppError,
    models::{Role, UserRead},
    services::AdminGate,
};
use actix_web::{get, post, web, HttpResponse, Responder};
use serde_json::json;
use validator::Validate;

/// Register a new user
///
/// Creates a `user`-role account and returns it without the password hash.
///
/// ## Responses:
/// - `201 Created`: the new `UserRead`.
/// - `400 Bad Request`: username or email already taken.
/// - `422 Unprocessable Entity`: field limits or email format violated.
#[post("/register")]
pub async fn register(
    credentials: web::Data<CredentialService>,
    events: web::Data<EventPublisher>,
    payload: web::Json<RegisterRequest>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    let user = credentials
        .register(&payload.username, &payload.email, &payload.password)
        .await?;

    events
        .notify(TASK_QUEUE, &Event::UserRegistered { user_id: user.id })
        .await;

    Ok(HttpResponse::Created().json(UserRead::from(user)))
}

/// Login user
///
/// Authenticates by username and password and returns a bearer token.
#[post("/login")]
pub async fn login(
    credentials: web::Data<CredentialService>,
    events: web::Data<EventPublisher>,
    payload: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    let user = credentials
        .authenticate(&payload.username, &payload.password)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    let token = credentials.issue_token(&user)?;
    log::info!("User {} logged in", user.id);

    events
        .notify(TASK_QUEUE, &Event::UserLoggedIn { user_id: user.id })
        .await;

    Ok(HttpResponse::Ok().json(TokenResponse::bearer(token)))
}

/// Login as administrator
///
/// Like `login`, but the account must have the `admin` role. When the admin gate runs in
/// rendezvous mode the issued token is also published to the admin queue.
#[post("/admin/login")]
pub async fn admin_login(
    credentials: web::Data<CredentialService>,
    gate: web::Data<AdminGate>,
    payload: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    payload.validate()?;

    let user = credentials
        .authenticate(&payload.username, &payload.password)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    credentials.require_role(&user, Role::Admin)?;

    let token = credentials.issue_token(&user)?;
    log::info!("Admin {} logged in", user.id);
    gate.announce(&token).await;

    Ok(HttpResponse::Ok().json(TokenResponse::bearer(token)))
}

/// Logout
///
/// Revokes the presented token; any later request carrying it is rejected.
#[post("/logout")]
pub async fn logout(
    credentials: web::Data<CredentialService>,
    events: web::Data<EventPublisher>,
    user: AuthenticatedUser,
    token: BearerToken,
) -> Result<impl Responder, AppError> {
    credentials.revoke(&token.0);
    log::info!("User {} logged out", user.0.id);

    events
        .notify(TASK_QUEUE, &Event::UserLoggedOut { user_id: user.0.id })
        .await;

    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully logged out" })))
}

#[get("/me")]
pub async fn me(user: AuthenticatedUser) -> impl Responder {
    HttpResponse::Ok().json(UserRead::from(user.0))
}
