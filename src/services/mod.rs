//! Domain services shared by the HTTP handlers. Each one holds its collaborators behind
//! trait objects so the same code runs against Postgres/RabbitMQ or the in-memory doubles.

pub mod admin;
pub mod tasks;

pub use admin::{AdminApproval, AdminGate, AdminGateMode, AdminService};
pub use tasks::TaskService;
