use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use sea_orm::EntityTrait;
use serde::Deserialize;

use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::{verify_token, Claims};
use crate::AppState;

#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

/// Browsers cannot set headers on WebSocket upgrades, so the token may
/// also arrive as `?access_token=`
fn bearer_token(request: &Request) -> Option<String> {
    if let Some(auth) = request.headers().typed_get::<Authorization<Bearer>>() {
        return Some(auth.token().to_string());
    }

    Query::<TokenQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(query)| query.access_token)
}

/// Extract and validate the auth provider's JWT
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let token = bearer_token(&request)
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;
    let claims = verify_token(&token, &state.config.jwt_secret)?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

fn claims(request: &Request) -> AppResult<&Claims> {
    request
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::Unauthorized("No authentication found".to_string()))
}

/// Require admin role
pub async fn require_admin(request: Request, next: Next) -> AppResult<Response> {
    if claims(&request)?.role != UserRole::Admin {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    Ok(next.run(request).await)
}

/// Require a profile an admin has approved; exposes it as an extension
pub async fn require_approved(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let user_id = claims(&request)?.sub;

    let user = user::Entity::find_by_id(user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::Forbidden("Complete your profile first".to_string()))?;

    if !user.may_carpool() {
        return Err(AppError::Forbidden(
            "Your account is waiting for approval".to_string(),
        ));
    }

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request as HttpRequest};

    use super::*;

    #[test]
    fn token_from_header_wins() {
        let request = HttpRequest::builder()
            .uri("/api/rides/1/live?access_token=query")
            .header("authorization", "Bearer header")
            .body(Body::empty())
            .unwrap();

        assert_eq!(bearer_token(&request).as_deref(), Some("header"));
    }

    #[test]
    fn token_from_query() {
        let request = HttpRequest::builder()
            .uri("/api/rides/1/live?foo=bar&access_token=abc.def.ghi")
            .body(Body::empty())
            .unwrap();

        assert_eq!(bearer_token(&request).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn query_token_is_percent_decoded() {
        let request = HttpRequest::builder()
            .uri("/api/rides/1/live?access_token=abc%2Bdef%3D%3D")
            .body(Body::empty())
            .unwrap();

        assert_eq!(bearer_token(&request).as_deref(), Some("abc+def=="));
    }

    #[test]
    fn no_token() {
        let request = HttpRequest::builder().uri("/api/rides").body(Body::empty()).unwrap();
        assert!(bearer_token(&request).is_none());
    }
}
