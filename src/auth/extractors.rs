use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpMessage, HttpRequest};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};

use super::{AuthError, CredentialService};
use crate::error::AppError;
use crate::models::{Role, User};
use crate::services::admin::{AdminApproval, AdminGate, AdminGateMode};

/// Reads the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// The user resolved by `AuthMiddleware`.
///
/// Missing from the extensions means the middleware did not run for this route, which is
/// reported as `Unauthorized`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or_else(|| AppError::from(AuthError::MissingToken)),
        )
    }
}

/// The raw bearer token of an authenticated request, used by logout.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl FromRequest for BearerToken {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<BearerToken>()
                .cloned()
                .ok_or_else(|| AppError::from(AuthError::MissingToken)),
        )
    }
}

/// Proof that an admin read may proceed.
///
/// In capability mode the request must carry a valid token of an `admin` user. In
/// rendezvous mode the request waits for a message on the admin queue.
#[derive(Debug, Clone)]
pub enum AdminAccess {
    Admin(User),
    Approved(AdminApproval),
}

impl FromRequest for AdminAccess {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let gate = req.app_data::<web::Data<AdminGate>>().cloned();
        let credentials = req.app_data::<web::Data<CredentialService>>().cloned();
        let token = bearer_token(req);

        Box::pin(admin_access(gate, credentials, token))
    }
}

async fn admin_access(
    gate: Option<web::Data<AdminGate>>,
    credentials: Option<web::Data<CredentialService>>,
    token: Option<String>,
) -> Result<AdminAccess, AppError> {
    let gate = gate
        .ok_or_else(|| AppError::InternalServerError("AdminGate is not registered".into()))?;

    match gate.mode() {
        AdminGateMode::Capability => {
            let credentials = credentials.ok_or_else(|| {
                AppError::InternalServerError("CredentialService is not registered".into())
            })?;
            let token = token.ok_or(AuthError::MissingToken)?;
            let user = credentials.validate(&token).await?;
            credentials.require_role(&user, Role::Admin)?;
            Ok(AdminAccess::Admin(user))
        }
        AdminGateMode::Rendezvous => Ok(AdminAccess::Approved(gate.await_approval().await?)),
    }
}
