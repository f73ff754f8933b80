//! Wires the services into actix application data and mounts the routes. Used by the
//! binary and by the integration tests, so both run the same application.

use std::sync::Arc;

use actix_web::web;

use crate::auth::{AuthMiddleware, CredentialService, TokenService};
use crate::broker::{EventPublisher, MessageBroker};
use crate::config::{Config, ServiceKind};
use crate::error::AppError;
use crate::routes::{self, health};
use crate::services::{AdminGate, AdminService, TaskService};
use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub credentials: web::Data<CredentialService>,
    pub tasks: web::Data<TaskService>,
    pub admin: web::Data<AdminService>,
    pub gate: web::Data<AdminGate>,
    pub events: web::Data<EventPublisher>,
    pub services: Vec<ServiceKind>,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn Store>, broker: Arc<dyn MessageBroker>) -> Self {
        let tokens = TokenService::new(
            &config.jwt_secret,
            chrono::Duration::minutes(config.token_ttl_minutes),
        );
        let events = EventPublisher::new(Arc::clone(&broker));

        Self {
            credentials: web::Data::new(CredentialService::new(
                Arc::clone(&store),
                tokens,
                config.bcrypt_cost,
            )),
            tasks: web::Data::new(TaskService::new(Arc::clone(&store), events.clone())),
            admin: web::Data::new(AdminService::new(store)),
            gate: web::Data::new(AdminGate::new(config.admin_gate, broker, config.admin_wait)),
            events: web::Data::new(events),
            services: config.services.clone(),
        }
    }

    /// Registers app data, the health probe and the `/api` scope behind `AuthMiddleware`.
    pub fn mount(&self, cfg: &mut web::ServiceConfig) {
        let json_config = web::JsonConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into());

        cfg.app_data(json_config)
            .app_data(self.credentials.clone())
            .app_data(self.tasks.clone())
            .app_data(self.admin.clone())
            .app_data(self.gate.clone())
            .app_data(self.events.clone())
            .app_data(web::Data::new(self.services.clone()))
            .service(health::health)
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware)
                    .configure(|cfg| routes::config(cfg, &self.services)),
            );
    }
}
