//! Property analysis and history handlers

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use propintel_common::{
    context::ContextSource,
    db::{HistoryStats, NewQueryRecord, QueryHistory, QueryRecord},
    errors::{AppError, Result},
    pipeline::{AnalysisSummary, ProcessingStages, QuestionType},
    providers::{AvailabilityReport, ProviderId, ProviderResult},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;

/// Popular questions shown next to the presets
const POPULAR_LIMIT: u64 = 5;
const DEFAULT_HISTORY_LIMIT: u64 = 50;
const MAX_HISTORY_LIMIT: u64 = 1000;

fn history_store(state: &AppState) -> Result<&QueryHistory> {
    state.history.as_ref().ok_or_else(|| AppError::ServiceUnavailable {
        message: "Database not available".to_string(),
    })
}

// ============================================================================
// Questions
// ============================================================================

#[derive(Debug, Serialize)]
pub struct QuestionEntry {
    pub question: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub count: i64,
}

#[derive(Serialize)]
pub struct QuestionsResponse {
    pub success: bool,
    pub questions: Vec<QuestionEntry>,
    pub preset_questions: Vec<String>,
    pub total_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Preset questions plus popular custom ones from history
pub async fn questions(State(state): State<AppState>) -> Json<QuestionsResponse> {
    let presets = state.analyzer.preset_questions().to_vec();

    let mut questions: Vec<QuestionEntry> = presets
        .iter()
        .map(|q| QuestionEntry {
            question: q.clone(),
            kind: "preset",
            count: 0,
        })
        .collect();

    if let Some(history) = state.history.as_ref() {
        match history.popular_questions(POPULAR_LIMIT).await {
            Ok(popular) => questions.extend(
                popular
                    .into_iter()
                    .filter(|(q, _)| !presets.contains(q))
                    .map(|(question, count)| QuestionEntry {
                        question,
                        kind: "popular",
                        count,
                    }),
            ),
            Err(e) => error!(error = %e, "Failed to load popular questions"),
        }
    }

    Json(QuestionsResponse {
        success: true,
        total_count: questions.len(),
        questions,
        preset_questions: presets,
        timestamp: Utc::now(),
    })
}

// ============================================================================
// Analyze
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct AnalyzeRequest {
    #[validate(length(min = 1, max = 2000, message = "Question must be 1-2000 characters"))]
    pub question: String,

    #[serde(default)]
    pub include_details: bool,
}

#[derive(Serialize)]
pub struct DetailedResults {
    pub claude_result: ProviderResult,
    pub gemini_result: ProviderResult,
    pub data_sources: Vec<ContextSource>,
}

#[derive(Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub question: String,
    pub question_type: QuestionType,
    pub answer: String,
    /// Seconds, two decimals
    pub processing_time: f64,
    pub query_id: Option<Uuid>,
    pub processing_stages: ProcessingStages,
    pub analysis_summary: AnalysisSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailed_results: Option<DetailedResults>,
}

/// Run the analysis pipeline for one question
pub async fn analyze(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalyzeResponse>> {
    let Json(mut request) = payload.map_err(|rejection| AppError::Validation {
        message: format!("Request body must be JSON with a question: {}", rejection.body_text()),
        field: None,
    })?;

    request.question = request.question.trim().to_string();
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("question".to_string()),
    })?;

    info!(question_chars = request.question.chars().count(), "Processing property question");
    let result = state.analyzer.analyze(&request.question).await;

    let mut query_id = None;
    if result.success {
        if let Some(history) = state.history.as_ref() {
            match history.store(NewQueryRecord::from_result(&result)).await {
                Ok(id) => query_id = Some(id),
                Err(e) => error!(error = %e, "Failed to store query"),
            }
        }
    }

    let analysis_summary = result.summary();
    let processing_time = (result.processing_time_ms as f64 / 10.0).round() / 100.0;

    let detailed_results = request.include_details.then(|| DetailedResults {
        claude_result: result.claude_result.clone(),
        gemini_result: result.gemini_result.clone(),
        data_sources: result.data_sources.clone(),
    });

    Ok(Json(AnalyzeResponse {
        success: result.success,
        question: result.question,
        question_type: result.question_type,
        answer: result.final_answer,
        processing_time,
        query_id,
        processing_stages: result.processing_stages,
        analysis_summary,
        error: result.error,
        timestamp: Utc::now(),
        detailed_results,
    }))
}

// ============================================================================
// History, stats and reset
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub history: Vec<QueryRecord>,
    pub count: usize,
    pub limit: u64,
    pub offset: u64,
    pub timestamp: DateTime<Utc>,
}

/// Out-of-range limits are clamped: above the max to the max, zero to 10
fn clamp_limit(limit: Option<u64>) -> u64 {
    match limit.unwrap_or(DEFAULT_HISTORY_LIMIT) {
        0 => 10,
        n if n > MAX_HISTORY_LIMIT => MAX_HISTORY_LIMIT,
        n => n,
    }
}

pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>> {
    let store = history_store(&state)?;
    let limit = clamp_limit(params.limit);
    let offset = params.offset.unwrap_or(0);

    let history = store.recent(limit, offset).await?;

    Ok(Json(HistoryResponse {
        success: true,
        count: history.len(),
        history,
        limit,
        offset,
        timestamp: Utc::now(),
    }))
}

#[derive(Serialize)]
pub struct SystemInfo {
    pub version: &'static str,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
#[serde(untagged)]
pub enum DatabaseStats {
    Available(HistoryStats),
    Unavailable { status: &'static str },
    Failed { error: String },
}

#[derive(Serialize)]
pub struct TimeoutSettings {
    pub llm_timeout: u64,
    pub max_retries: u32,
}

#[derive(Serialize)]
pub struct ConfigurationSummary {
    pub enabled_providers: Vec<ProviderId>,
    pub preset_questions_count: usize,
    pub timeout_settings: TimeoutSettings,
}

#[derive(Serialize)]
pub struct Stats {
    pub system_info: SystemInfo,
    pub database: DatabaseStats,
    pub llm_providers: AvailabilityReport,
    pub configuration: ConfigurationSummary,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: Stats,
    pub timestamp: DateTime<Utc>,
}

/// History aggregates, provider availability and configuration summary
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let database = match state.history.as_ref() {
        Some(history) => match history.stats().await {
            Ok(stats) => DatabaseStats::Available(stats),
            Err(e) => {
                error!(error = %e, "Failed to load history stats");
                DatabaseStats::Failed { error: e.to_string() }
            }
        },
        None => DatabaseStats::Unavailable {
            status: "not_available",
        },
    };

    let config = &state.config;
    Json(StatsResponse {
        success: true,
        stats: Stats {
            system_info: SystemInfo {
                version: propintel_common::VERSION,
                uptime_secs: state.started_at.elapsed().as_secs(),
            },
            database,
            llm_providers: state.analyzer.gateway().availability(),
            configuration: ConfigurationSummary {
                enabled_providers: config.enabled_providers(),
                preset_questions_count: config.analysis.preset_questions.len(),
                timeout_settings: TimeoutSettings {
                    llm_timeout: config.llm.timeout_secs,
                    max_retries: config.llm.max_retries,
                },
            },
        },
        timestamp: Utc::now(),
    })
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub success: bool,
    pub message: &'static str,
    pub cleared_queries: u64,
    pub timestamp: DateTime<Utc>,
}

/// Delete the whole query history
pub async fn reset(State(state): State<AppState>) -> Result<Json<ResetResponse>> {
    let store = history_store(&state)?;
    let cleared_queries = store.clear().await?;

    info!(cleared_queries, "Query history reset");
    Ok(Json(ResetResponse {
        success: true,
        message: "Database reset successfully",
        cleared_queries,
        timestamp: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(0)), 10);
        assert_eq!(clamp_limit(Some(25)), 25);
        assert_eq!(clamp_limit(Some(5000)), 1000);
    }

    #[test]
    fn test_request_validation() {
        let ok = AnalyzeRequest {
            question: "Is Brisbane growing?".into(),
            include_details: false,
        };
        assert!(ok.validate().is_ok());

        let empty = AnalyzeRequest {
            question: String::new(),
            include_details: false,
        };
        assert!(empty.validate().is_err());

        let long = AnalyzeRequest {
            question: "a".repeat(2001),
            include_details: false,
        };
        assert!(long.validate().is_err());
    }
}
