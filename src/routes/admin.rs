use crate::{auth::AdminAccess, error::AppError, services::AdminService};
use actix_web::dev::Payload;
use actix_web::{get, post, web, FromRequest, HttpRequest, HttpResponse, Responder};
use serde_json::json;
use std::future::{ready, Ready};

/// Collects every `id` query parameter, e.g. `?id=1&id=2`.
fn parse_ids(query: &[(String, String)]) -> Result<Vec<i32>, AppError> {
    query
        .iter()
        .filter(|(key, _)| key == "id")
        .map(|(_, value)| {
            value
                .parse()
                .map_err(|_| AppError::BadRequest(format!("Invalid id: {}", value)))
        })
        .collect()
}

/// The `id` query parameters of a lookup.
///
/// Handlers take this before `AdminAccess`: extractors resolve in argument order, so a
/// malformed query is rejected before the gate consumes an approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdList(pub Vec<i32>);

impl FromRequest for IdList {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            web::Query::<Vec<(String, String)>>::from_query(req.query_string())
                .map_err(|e| AppError::BadRequest(e.to_string()))
                .and_then(|query| parse_ids(&query))
                .map(IdList),
        )
    }
}

#[get("/users")]
pub async fn users_by_ids(
    admin: web::Data<AdminService>,
    ids: IdList,
    _access: AdminAccess,
) -> Result<impl Responder, AppError> {
    Ok(HttpResponse::Ok().json(admin.users_by_ids(&ids.0).await?))
}

#[get("/tasks")]
pub async fn tasks_by_ids(
    admin: web::Data<AdminService>,
    ids: IdList,
    _access: AdminAccess,
) -> Result<impl Responder, AppError> {
    Ok(HttpResponse::Ok().json(admin.tasks_by_ids(&ids.0).await?))
}

#[get("/users/count")]
pub async fn count_users(
    admin: web::Data<AdminService>,
    _access: AdminAccess,
) -> Result<impl Responder, AppError> {
    Ok(HttpResponse::Ok().json(json!({ "number": admin.count_users().await? })))
}

#[get("/tasks/count")]
pub async fn count_tasks(
    admin: web::Data<AdminService>,
    _access: AdminAccess,
) -> Result<impl Responder, AppError> {
    Ok(HttpResponse::Ok().json(json!({ "number": admin.count_tasks().await? })))
}

/// Stores a statistics snapshot (user count, task count, average tasks per user).
#[post("/save")]
pub async fn save_status(
    admin: web::Data<AdminService>,
    _access: AdminAccess,
) -> Result<impl Responder, AppError> {
    let status = admin.save_snapshot().await?;
    Ok(HttpResponse::Created().json(status))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_repeated_ids() {
        let ids = parse_ids(&pairs(&[("id", "1"), ("other", "x"), ("id", "3")])).unwrap();
        assert_eq!(ids, vec![1, 3]);
        assert!(parse_ids(&[]).unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn test_id_list_extractor() {
        let req = actix_web::test::TestRequest::get()
            .uri("/users?id=4&id=9")
            .to_http_request();
        let ids = IdList::extract(&req).await.unwrap();
        assert_eq!(ids, IdList(vec![4, 9]));

        let req = actix_web::test::TestRequest::get()
            .uri("/users?id=4&id=x")
            .to_http_request();
        assert!(matches!(
            IdList::extract(&req).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_numeric_id() {
        assert!(matches!(
            parse_ids(&pairs(&[("id", "abc")])),
            Err(AppError::BadRequest(_))
        ));
    }
}
