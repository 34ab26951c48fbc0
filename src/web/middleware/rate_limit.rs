//! Rate limiting middleware.

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};

use crate::web::error::ApiError;

/// How often idle per-IP entries are dropped.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// State for rate limiting.
#[derive(Clone)]
pub struct RateLimitState {
    /// Per-IP rate limiter.
    limiter: Arc<DefaultKeyedRateLimiter<String>>,
    /// Requests per minute allowed for each IP.
    requests_per_minute: u32,
}

impl RateLimitState {
    /// Create a new rate limit state.
    pub fn new(requests_per_minute: u32) -> Self {
        let quota =
            Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            requests_per_minute,
        }
    }

    /// Requests per minute allowed for each IP.
    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// Check if a request from `ip` is allowed.
    pub fn check(&self, ip: &str) -> bool {
        self.limiter.check_key(&ip.to_string()).is_ok()
    }

    /// Drop entries whose quota has fully replenished.
    pub fn cleanup(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Start a background task to periodically clean up old entries.
    pub fn start_cleanup_task(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(CLEANUP_INTERVAL).await;
                self.cleanup();
            }
        });
    }
}

impl std::fmt::Debug for RateLimitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitState")
            .field("requests_per_minute", &self.requests_per_minute)
            .finish_non_exhaustive()
    }
}

/// Extract client IP from request.
fn get_client_ip(req: &Request<Body>) -> String {
    // Try X-Forwarded-For header first (for reverse proxy)
    if let Some(forwarded) = req
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
    {
        // Take the first IP in the chain
        if let Some(ip) = forwarded.split(',').next() {
            return ip.trim().to_string();
        }
    }

    if let Some(real_ip) = req
        .headers()
        .get("X-Real-IP")
        .and_then(|v| v.to_str().ok())
    {
        return real_ip.to_string();
    }

    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    "unknown".to_string()
}

/// Per-IP rate limiting middleware.
pub async fn rate_limit(state: Arc<RateLimitState>, req: Request<Body>, next: Next) -> Response {
    let ip = get_client_ip(&req);

    if !state.check(&ip) {
        tracing::warn!(ip = %ip, "Rate limit exceeded");
        return ApiError::too_many_requests("Too many requests. Please try again later.")
            .into_response();
    }

    next.run(req).await
}
