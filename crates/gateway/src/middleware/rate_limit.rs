//! Rate limiting for the analysis endpoint (token bucket)

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use propintel_common::errors::AppError;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Process-wide limiter (not keyed by client)
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Limiter plus the configured rate, reported in 429 bodies
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<GlobalRateLimiter>,
    per_second: u32,
}

impl RateLimitState {
    fn check(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

/// Create a limiter; a zero rate is raised to one, a zero burst means no burst
pub fn create_rate_limiter(requests_per_second: u32, burst: u32) -> RateLimitState {
    let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(rate);

    RateLimitState {
        limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate).allow_burst(burst))),
        per_second: rate.get(),
    }
}

/// Reject with 429 once the bucket is empty
pub async fn rate_limit_middleware(
    State(limiter): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    if limiter.check() {
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
    AppError::RateLimited {
        limit: limiter.per_second,
    }
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_reject() {
        let limiter = create_rate_limiter(1, 2);
        assert!(limiter.check());
        assert!(limiter.check());
        assert!(!limiter.check());
    }

    #[test]
    fn test_zero_config_still_allows_one() {
        let limiter = create_rate_limiter(0, 0);
        assert_eq!(limiter.per_second, 1);
        assert!(limiter.check());
    }
}
