#![doc = "The `taskrelay` library crate."]
#![doc = ""]
#![doc = "A small task-management platform: user accounts with bearer-token sessions, per-user"]
#![doc = "task CRUD and gated admin reads, backed by Postgres and coordinated over durable"]
#![doc = "RabbitMQ queues. The binary (`main.rs`) builds an `app::AppState` from `config::Config`"]
#![doc = "and serves it with actix-web."]

pub mod app;
pub mod auth;
pub mod broker;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

pub use app::AppState;
pub use config::{Config, ServiceKind};
pub use error::AppError;
