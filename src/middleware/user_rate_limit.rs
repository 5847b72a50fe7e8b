use axum::http::Request;
use std::sync::Arc;
use tower_governor::{
    governor::GovernorConfigBuilder,
    key_extractor::KeyExtractor,
    GovernorError, GovernorLayer,
};
use uuid::Uuid;

use crate::utils::jwt::Claims;

/// Key extractor that uses the token subject set by `auth_middleware`
#[derive(Debug, Clone, Copy)]
pub struct UserIdExtractor;

impl KeyExtractor for UserIdExtractor {
    type Key = Uuid;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let claims = req
            .extensions()
            .get::<Claims>()
            .ok_or(GovernorError::UnableToExtractKey)?;

        Ok(claims.sub)
    }
}

pub type UserGovernorLayer = GovernorLayer<
    UserIdExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

/// Position updates arrive every few seconds while driving, so they get
/// their own, larger budget.
pub enum RateLimitedTier {
    Standard,
    Tracking,
}

pub fn create_user_governor(tier: RateLimitedTier) -> UserGovernorLayer {
    let (per_ms, burst) = match tier {
        RateLimitedTier::Standard => (600, 100), // 100 per minute
        RateLimitedTier::Tracking => (200, 300), // 300 per minute
    };

    let config = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(burst)
            .key_extractor(UserIdExtractor)
            .finish()
            .expect("rate limit settings are non-zero"),
    );

    GovernorLayer::new(config)
}
