use axum::{
    body::Body,
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

/// Limiters keyed by the peer address
pub type IpGovernorLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    Body,
>;

fn ip_governor(per_ms: u64, burst: u32) -> IpGovernorLayer {
    let config = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(burst)
            .finish()
            .expect("rate limit settings are non-zero"),
    );

    GovernorLayer::new(config)
}

/// Outermost limiter, in front of authentication: 1000 requests a minute per IP
pub fn create_global_governor() -> IpGovernorLayer {
    ip_governor(60, 1000)
}

/// Unauthenticated endpoints: 100 requests per minute per IP
pub fn create_public_governor() -> IpGovernorLayer {
    ip_governor(600, 100)
}

/// Log every request with its peer address, status and latency.
///
/// Rejections by the governors never reach a handler, so this is the only
/// place they show up.
pub async fn log_request(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let client_ip = addr.ip();

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            tracing::warn!(%client_ip, %method, %path, "Rate limited")
        }
        s if s.is_server_error() => {
            tracing::error!(%client_ip, %method, %path, status = s.as_u16(), elapsed_ms, "Request failed")
        }
        s if s.is_client_error() => {
            tracing::info!(%client_ip, %method, %path, status = s.as_u16(), elapsed_ms, "Request rejected")
        }
        s => tracing::debug!(%client_ip, %method, %path, status = s.as_u16(), elapsed_ms, "Request completed"),
    }

    response
}
