#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::{test, App};
use serde_json::json;

use taskrelay::auth::{hash_password, TokenResponse};
use taskrelay::broker::{declare_topology, InMemoryBroker};
use taskrelay::models::{NewUser, Role, User};
use taskrelay::services::AdminGateMode;
use taskrelay::store::{MemoryStore, Store};
use taskrelay::{AppState, Config, ServiceKind};

pub const TEST_BCRYPT_COST: u32 = 4;

/// Application state over in-memory doubles, plus handles to inspect them.
pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub broker: Arc<InMemoryBroker>,
    pub state: AppState,
}

pub fn test_config(gate: AdminGateMode, admin_wait: Duration) -> Config {
    let mut config = Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("postgres://unused".to_string()),
        "JWT_SECRET" => Some("integration_test_secret".to_string()),
        "BCRYPT_COST" => Some(TEST_BCRYPT_COST.to_string()),
        _ => None,
    })
    .expect("test configuration is valid");
    config.admin_gate = gate;
    config.admin_wait = admin_wait;
    config
}

pub async fn context_with(gate: AdminGateMode, admin_wait: Duration) -> TestContext {
    let config = test_config(gate, admin_wait);
    let store = Arc::new(MemoryStore::new());
    let broker = Arc::new(InMemoryBroker::new());
    declare_topology(broker.as_ref(), &ServiceKind::ALL)
        .await
        .expect("in-memory topology");

    let state = AppState::new(&config, store.clone(), broker.clone());
    TestContext {
        store,
        broker,
        state,
    }
}

pub async fn context() -> TestContext {
    context_with(AdminGateMode::Capability, Duration::from_secs(1)).await
}

pub async fn init_app(
    state: &AppState,
) -> impl Service<actix_http::Request, Response = ServiceResponse<impl MessageBody>, Error = actix_web::Error>
{
    test::init_service(App::new().configure(|cfg| state.mount(cfg))).await
}

/// Inserts an admin account directly; registration only ever creates `user` accounts.
pub async fn insert_admin(store: &MemoryStore, username: &str, password: &str) -> User {
    store
        .insert_user(NewUser {
            username: username.to_string(),
            email: format!("{}@admin.example.com", username),
            password_hash: hash_password(password, TEST_BCRYPT_COST).unwrap(),
            role: Role::Admin,
        })
        .await
        .unwrap()
}

pub async fn register_user<S, B>(app: &S, username: &str, email: &str, password: &str) -> ServiceResponse<B>
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = test::TestRequest::post()
        .uri("/api/users/register")
        .set_json(json!({
            "username": username,
            "email": email,
            "password": password
        }))
        .to_request();
    test::call_service(app, req).await
}

pub async fn login<S, B>(app: &S, path: &str, username: &str, password: &str) -> ServiceResponse<B>
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = test::TestRequest::post()
        .uri(path)
        .set_json(json!({
            "username": username,
            "password": password
        }))
        .to_request();
    test::call_service(app, req).await
}

/// Registers `username` and returns a fresh bearer token for it.
pub async fn register_and_login<S, B>(app: &S, username: &str, password: &str) -> String
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let email = format!("{}@example.com", username);
    let registered = register_user(app, username, &email, password).await;
    assert!(
        registered.status().is_success(),
        "registration of {} failed: {}",
        username,
        registered.status()
    );

    let resp = login(app, "/api/users/login", username, password).await;
    assert!(resp.status().is_success(), "login of {} failed", username);
    let body: TokenResponse = test::read_body_json(resp).await;
    body.access_token
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

/// Status of a request whether it was answered by a handler or rejected by middleware.
pub async fn call_status<S, B>(app: &S, req: actix_http::Request) -> actix_web::http::StatusCode
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    match test::try_call_service(app, req).await {
        Ok(resp) => resp.status(),
        Err(err) => err.as_response_error().status_code(),
    }
}
