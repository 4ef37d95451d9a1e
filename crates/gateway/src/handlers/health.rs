//! Service information and health check handlers

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use propintel_common::{
    news::{FeedStatusReport, NewsSource},
    providers::{AvailabilityReport, ProviderId},
    SERVICE_NAME, VERSION,
};
use serde::Serialize;
use std::time::Instant;
use tracing::warn;

use super::ENDPOINTS;
use crate::AppState;

const FEATURES: &[&str] = &[
    "Multi-LLM analysis (Claude strategic pass, Gemini comprehensive pass)",
    "Live Australian property RSS feeds",
    "Keyword-tailored fallback answers",
    "Query history and statistics",
    "Health and provider diagnostics",
];

#[derive(Serialize)]
pub struct IndexResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub features: &'static [&'static str],
    pub available_providers: Vec<ProviderId>,
    pub preset_questions: Vec<String>,
    pub api_endpoints: &'static [&'static str],
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    fn not_configured() -> Self {
        Self {
            status: "not_configured".to_string(),
            latency_ms: None,
            error: None,
        }
    }
}

#[derive(Serialize)]
pub struct NewsHealth {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feeds: Option<FeedStatusReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_error: Option<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    /// `healthy` with both providers, `degraded` with fewer
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
    pub providers: AvailabilityReport,
    pub available_providers: Vec<ProviderId>,
    pub database: CheckResult,
    pub news: NewsHealth,
}

/// Service description
pub async fn index(State(state): State<AppState>) -> Json<IndexResponse> {
    Json(IndexResponse {
        name: SERVICE_NAME,
        version: VERSION,
        status: "running",
        timestamp: Utc::now(),
        features: FEATURES,
        available_providers: state.analyzer.gateway().available_providers(),
        preset_questions: state.analyzer.preset_questions().to_vec(),
        api_endpoints: ENDPOINTS,
    })
}

async fn database_check(state: &AppState) -> CheckResult {
    let Some(history) = state.history.as_ref() else {
        return CheckResult::not_configured();
    };

    let start = Instant::now();
    match history.ping().await {
        Ok(_) => CheckResult {
            status: "up".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => CheckResult {
            status: "down".to_string(),
            latency_ms: None,
            error: Some(e.to_string()),
        },
    }
}

fn overall_status(available: usize) -> &'static str {
    match available {
        n if n == ProviderId::ALL.len() => "healthy",
        _ => "degraded",
    }
}

/// Fetch through the cache, so only stale feeds hit the network
async fn refresh(news: &dyn NewsSource) -> Option<String> {
    match news.fetch("health check", false, 1).await {
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "Feed refresh failed during deep health check");
            Some(e.to_string())
        }
    }
}

async fn build_health(state: &AppState, refresh_feeds: bool) -> HealthResponse {
    let gateway = state.analyzer.gateway();
    let available_providers = gateway.available_providers();

    let mut refresh_error = None;
    let feeds = match state.news.as_ref() {
        Some(news) => {
            if refresh_feeds {
                refresh_error = refresh(&**news).await;
            }
            Some(news.feed_status().await)
        }
        None => None,
    };

    HealthResponse {
        status: overall_status(available_providers.len()),
        version: VERSION,
        timestamp: Utc::now(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        providers: gateway.availability(),
        available_providers,
        database: database_check(state).await,
        news: NewsHealth {
            enabled: state.news.is_some(),
            feeds,
            refresh_error,
        },
    }
}

/// Provider availability plus collaborator status
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(build_health(&state, false).await)
}

/// Like `health`, but also fetches stale feeds before reporting
pub async fn deep_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(build_health(&state, true).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use propintel_common::{
        context::ContextSource,
        errors::{AppError, Result},
    };

    struct FailingNews;

    #[async_trait]
    impl NewsSource for FailingNews {
        async fn fetch(&self, _query: &str, _region_focus: bool, _max_items: usize) -> Result<Vec<ContextSource>> {
            Err(AppError::ContextUnavailable {
                message: "feeds offline".into(),
            })
        }
    }

    struct EmptyNews;

    #[async_trait]
    impl NewsSource for EmptyNews {
        async fn fetch(&self, _query: &str, _region_focus: bool, _max_items: usize) -> Result<Vec<ContextSource>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_refresh_reports_fetch_error() {
        let error = refresh(&FailingNews).await.unwrap();
        assert!(error.contains("feeds offline"));
        assert_eq!(refresh(&EmptyNews).await, None);
    }

    #[test]
    fn test_overall_status() {
        assert_eq!(overall_status(2), "healthy");
        assert_eq!(overall_status(1), "degraded");
        assert_eq!(overall_status(0), "degraded");
    }
}
