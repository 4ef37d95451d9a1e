//! API handlers module

pub mod debug;
pub mod health;
pub mod property;

use axum::{http::StatusCode, Json};
use serde::Serialize;

/// Routes advertised by the root and 404 responses
pub const ENDPOINTS: &[&str] = &[
    "GET /",
    "GET /health",
    "GET /health/deep",
    "GET /api/property/questions",
    "POST /api/property/analyze",
    "GET /api/property/history",
    "GET /api/property/stats",
    "POST /api/property/reset",
    "GET /debug/providers",
    "GET /debug/rss",
    "POST /debug/rss/refresh",
];

#[derive(Serialize)]
pub struct NotFoundResponse {
    pub success: bool,
    pub error: &'static str,
    pub available_endpoints: &'static [&'static str],
}

/// Fallback for unknown routes
pub async fn not_found() -> (StatusCode, Json<NotFoundResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(NotFoundResponse {
            success: false,
            error: "Endpoint not found",
            available_endpoints: ENDPOINTS,
        }),
    )
}
