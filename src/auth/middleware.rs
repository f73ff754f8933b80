use std::rc::Rc;

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web, Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};

use super::extractors::{bearer_token, AuthenticatedUser, BearerToken};
use super::{AuthError, CredentialService};
use crate::error::AppError;

/// Paths under the wrapped scope that are reachable without a bearer token. Admin routes
/// are gated by their own extractor.
fn is_public(path: &str) -> bool {
    matches!(
        path,
        "/api/users/register" | "/api/users/login" | "/api/users/admin/login"
    ) || path.starts_with("/api/admin/")
}

/// Validates the bearer token of every non-public request and stores the resolved user
/// (and the raw token) in the request extensions.
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            if is_public(req.path()) {
                return service.call(req).await;
            }

            let credentials = req
                .app_data::<web::Data<CredentialService>>()
                .cloned()
                .ok_or_else(|| {
                    AppError::InternalServerError("CredentialService is not registered".into())
                })?;

            let token =
                bearer_token(req.request()).ok_or(AppError::from(AuthError::MissingToken))?;
            let user = credentials
                .validate(&token)
                .await
                .map_err(AppError::from)?;

            req.extensions_mut().insert(AuthenticatedUser(user));
            req.extensions_mut().insert(BearerToken(token));
            service.call(req).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_paths() {
        assert!(is_public("/api/users/register"));
        assert!(is_public("/api/users/login"));
        assert!(is_public("/api/users/admin/login"));
        assert!(is_public("/api/admin/users/count"));
        assert!(!is_public("/api/users/me"));
        assert!(!is_public("/api/users/logout"));
        assert!(!is_public("/api/tasks"));
    }
}
