use axum::{
    middleware,
    routing::{delete, get, post, put},
    Json, Router,
};

use crate::handlers::{admin, bookings, live, prayers, profile, rides};
use crate::middleware::auth::{auth_middleware, require_admin, require_approved};
use crate::middleware::rate_limit::create_public_governor;
use crate::middleware::user_rate_limit::{create_user_governor, RateLimitedTier};
use crate::AppState;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn create_router(state: AppState) -> Router {
    let standard_governor = create_user_governor(RateLimitedTier::Standard);
    let tracking_governor = create_user_governor(RateLimitedTier::Tracking);
    let public_governor = create_public_governor();

    // Public routes
    let public_routes = Router::new()
        .route("/prayers", get(prayers::list_prayers))
        .layer(public_governor);

    // Profile routes (authenticated, approval not required yet)
    let profile_routes = Router::new()
        .route("/", get(profile::get_me).put(profile::upsert_me))
        .layer(standard_governor.clone())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Position reports come every few seconds while driving
    let tracking_routes = Router::new()
        .route("/{id}/position", post(rides::report_position))
        .route("/{id}/position-error", post(rides::report_position_error))
        .layer(tracking_governor);

    // Ride routes (requires auth + approved profile)
    let ride_routes = Router::new()
        .route("/", post(rides::create_ride).get(rides::list_rides))
        .route("/mine", get(rides::my_rides))
        .route("/{id}", get(rides::get_ride).delete(rides::cancel_ride))
        .route("/{id}/passengers", get(rides::ride_passengers))
        .route("/{id}/end", post(rides::end_ride))
        .route("/{id}/live", get(live::ride_live))
        .layer(standard_governor.clone())
        .merge(tracking_routes)
        .layer(middleware::from_fn_with_state(state.clone(), require_approved))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Booking routes (requires auth + approved profile)
    let booking_routes = Router::new()
        .route("/", post(bookings::create_booking).get(bookings::my_bookings))
        .route("/{id}", delete(bookings::cancel_booking))
        .route("/{id}/pickup", put(bookings::update_pickup))
        .layer(standard_governor)
        .layer(middleware::from_fn_with_state(state.clone(), require_approved))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Admin routes (requires auth + admin role)
    let admin_routes = Router::new()
        .route("/prayers", get(admin::list_prayers).post(admin::create_prayer))
        .route(
            "/prayers/{id}",
            put(admin::update_prayer).delete(admin::delete_prayer),
        )
        .route("/users", get(admin::list_users))
        .route("/users/{id}", delete(admin::delete_user))
        .route("/users/{id}/approval", put(admin::set_approval))
        .route("/rides", get(admin::list_rides))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/health", get(health))
        .nest("/api", public_routes)
        .nest("/api/me", profile_routes)
        .nest("/api/rides", ride_routes)
        .nest("/api/bookings", booking_routes)
        .nest("/api/admin", admin_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use sea_orm::DatabaseConnection;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::config::Config;
    use crate::entities::user::UserRole;
    use crate::utils::jwt::create_token;

    const SECRET: &str = "test-secret";

    fn router() -> Router {
        let config = Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://unused".to_string()),
            "JWT_SECRET" => Some(SECRET.to_string()),
            _ => None,
        })
        .unwrap();

        create_router(AppState::new(DatabaseConnection::Disconnected, config))
    }

    async fn status_of(request: Request<Body>) -> StatusCode {
        router().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn health_is_public() {
        let request = Request::get("/health").body(Body::empty()).unwrap();
        assert_eq!(status_of(request).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn rides_require_a_token() {
        let request = Request::get(format!("/api/rides/{}", Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn forged_token_is_rejected() {
        let token = create_token(Uuid::new_v4(), UserRole::Admin, "not-the-secret");
        let request = Request::get("/api/admin/users")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(request).await, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_routes_reject_members() {
        let token = create_token(Uuid::new_v4(), UserRole::Member, SECRET);
        let request = Request::get("/api/admin/users")
            .header("authorization", format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        assert_eq!(status_of(request).await, StatusCode::FORBIDDEN);
    }
}
