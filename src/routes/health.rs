use actix_web::{get, web, HttpResponse, Responder};
use chrono::Utc;
use serde_json::json;

use crate::config::ServiceKind;

/// Liveness probe. Reports which route groups this process serves; does not touch the
/// store or the broker.
#[get("/health")]
pub async fn health(services: web::Data<Vec<ServiceKind>>) -> impl Responder {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "serves": services.as_slice(),
        "timestamp": Utc::now()
    }))
}
