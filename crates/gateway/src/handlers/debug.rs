//! Diagnostics for providers and news feeds

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use propintel_common::{
    context::ContextSource,
    errors::{AppError, Result},
    news::{FeedStatusReport, NewsSource, RssNewsService},
    providers::{AvailabilityReport, ProviderId},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::AppState;

const SAMPLE_ITEMS: usize = 3;
const SAMPLE_QUERY: &str = "Brisbane property market";

fn news_service(state: &AppState) -> Result<&Arc<RssNewsService>> {
    state.news.as_ref().ok_or_else(|| AppError::ServiceUnavailable {
        message: "News feeds are disabled".to_string(),
    })
}

#[derive(Serialize)]
pub struct ProvidersResponse {
    pub providers: AvailabilityReport,
    pub available_providers: Vec<ProviderId>,
    pub timestamp: DateTime<Utc>,
}

pub async fn providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    let gateway = state.analyzer.gateway();
    Json(ProvidersResponse {
        providers: gateway.availability(),
        available_providers: gateway.available_providers(),
        timestamp: Utc::now(),
    })
}

#[derive(Serialize)]
pub struct RssResponse {
    pub success: bool,
    pub status: FeedStatusReport,
    pub sample: Vec<ContextSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

async fn sampled(news: &RssNewsService) -> RssResponse {
    let (sample, error) = match news.fetch(SAMPLE_QUERY, false, SAMPLE_ITEMS).await {
        Ok(items) => (items, None),
        Err(e) => {
            warn!(error = %e, "Sample feed fetch failed");
            (Vec::new(), Some(e.to_string()))
        }
    };

    RssResponse {
        success: error.is_none(),
        status: news.feed_status().await,
        sample,
        error,
        timestamp: Utc::now(),
    }
}

/// Feed health plus a small sample of current items
pub async fn rss(State(state): State<AppState>) -> Result<Json<RssResponse>> {
    let news = news_service(&state)?;
    Ok(Json(sampled(news).await))
}

/// Drop the feed cache and fetch again
pub async fn refresh_rss(State(state): State<AppState>) -> Result<Json<RssResponse>> {
    let news = news_service(&state)?;
    news.clear_cache().await;
    info!("Refreshing news feeds");
    Ok(Json(sampled(news).await))
}
