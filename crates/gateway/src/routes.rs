//! Router assembly

use crate::handlers;
use crate::middleware::{create_rate_limiter, rate_limit_middleware, track_metrics};
use crate::AppState;
use axum::{
    http::{HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let mut analyze = Router::new().route("/analyze", post(handlers::property::analyze));
    if state.config.rate_limit.enabled {
        let limiter = create_rate_limiter(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        );
        analyze = analyze.route_layer(from_fn_with_state(limiter, rate_limit_middleware));
    }

    let property_routes = Router::new()
        .route("/questions", get(handlers::property::questions))
        .route("/history", get(handlers::property::history))
        .route("/stats", get(handlers::property::stats))
        .route("/reset", post(handlers::property::reset))
        .merge(analyze);

    let debug_routes = Router::new()
        .route("/providers", get(handlers::debug::providers))
        .route("/rss", get(handlers::debug::rss))
        .route("/rss/refresh", post(handlers::debug::refresh_rss));

    let request_timeout = state.config.request_timeout();

    Router::new()
        .route("/", get(handlers::health::index))
        .route("/health", get(handlers::health::health))
        .route("/health/deep", get(handlers::health::deep_health))
        .nest("/api/property", property_routes)
        .nest("/debug", debug_routes)
        .route_layer(from_fn(track_metrics))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(allowed))
}
