//! Query history store
//!
//! Every successful analysis is archived with the real outcome of each
//! provider, so per-provider statistics are counted rather than inferred.

use crate::config::DatabaseConfig;
use crate::db::models::*;
use crate::errors::{AppError, Result};
use crate::pipeline::{PipelineResult, QuestionType};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, instrument};
use uuid::Uuid;

/// Fields captured for one analysis
#[derive(Debug, Clone)]
pub struct NewQueryRecord {
    pub question: String,
    pub question_type: QuestionType,
    pub answer: String,
    pub processing_ms: u64,
    pub success: bool,
    pub claude_success: bool,
    pub gemini_success: bool,
    pub claude_model: Option<String>,
    pub gemini_model: Option<String>,
    pub data_sources_count: usize,
    pub real_data_used: bool,
}

impl NewQueryRecord {
    pub fn from_result(result: &PipelineResult) -> Self {
        let stages = &result.processing_stages;
        Self {
            question: result.question.clone(),
            question_type: result.question_type,
            answer: result.final_answer.clone(),
            processing_ms: result.processing_time_ms,
            success: result.success,
            claude_success: stages.claude_success,
            gemini_success: stages.gemini_success,
            claude_model: stages.claude_model.clone(),
            gemini_model: stages.gemini_model.clone(),
            data_sources_count: stages.data_sources_count,
            real_data_used: stages.real_data_used,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSuccessCounts {
    pub claude: u64,
    pub gemini: u64,
}

/// Aggregates over the whole history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_queries: u64,
    pub successful_queries: u64,
    /// Percentage of successful queries, 0 when empty
    pub success_rate: f64,
    pub average_processing_ms: Option<f64>,
    pub by_question_type: BTreeMap<String, i64>,
    pub provider_success: ProviderSuccessCounts,
}

/// Repository for analysed questions
#[derive(Clone)]
pub struct QueryHistory {
    conn: DatabaseConnection,
}

impl QueryHistory {
    /// Wrap an existing connection
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Connect and make sure the schema exists
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let conn = super::connect(config).await?;
        super::ensure_schema(&conn).await?;
        Ok(Self::new(conn))
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;
        Ok(())
    }

    /// Archive one analysis and return its id
    #[instrument(skip(self, record), fields(question_type = record.question_type.as_str()))]
    pub async fn store(&self, record: NewQueryRecord) -> Result<Uuid> {
        let id = Uuid::now_v7();

        let model = QueryActiveModel {
            id: Set(id),
            question: Set(record.question),
            question_type: Set(record.question_type.as_str().to_string()),
            answer: Set(record.answer),
            processing_ms: Set(i64::try_from(record.processing_ms).unwrap_or(i64::MAX)),
            success: Set(record.success),
            claude_success: Set(record.claude_success),
            gemini_success: Set(record.gemini_success),
            claude_model: Set(record.claude_model),
            gemini_model: Set(record.gemini_model),
            data_sources_count: Set(i32::try_from(record.data_sources_count).unwrap_or(i32::MAX)),
            real_data_used: Set(record.real_data_used),
            created_at: Set(chrono::Utc::now()),
        };

        model.insert(&self.conn).await?;
        info!(query_id = %id, "Query stored");
        Ok(id)
    }

    /// Newest records first
    pub async fn recent(&self, limit: u64, offset: u64) -> Result<Vec<QueryRecord>> {
        QueryEntity::find()
            .order_by_desc(QueryColumn::CreatedAt)
            .order_by_desc(QueryColumn::Id)
            .offset(offset)
            .limit(limit)
            .all(&self.conn)
            .await
            .map_err(Into::into)
    }

    /// Most asked questions with their counts
    pub async fn popular_questions(&self, limit: u64) -> Result<Vec<(String, i64)>> {
        QueryEntity::find()
            .select_only()
            .column(QueryColumn::Question)
            .column_as(Expr::col(QueryColumn::Id).count(), "times_asked")
            .group_by(QueryColumn::Question)
            .order_by_desc(Expr::cust("times_asked"))
            .order_by_asc(QueryColumn::Question)
            .limit(limit)
            .into_tuple::<(String, i64)>()
            .all(&self.conn)
            .await
            .map_err(Into::into)
    }

    pub async fn stats(&self) -> Result<HistoryStats> {
        let total_queries = QueryEntity::find().count(&self.conn).await?;
        let successful_queries = QueryEntity::find()
            .filter(QueryColumn::Success.eq(true))
            .count(&self.conn)
            .await?;

        let average_processing_ms = QueryEntity::find()
            .select_only()
            .column_as(
                Expr::cust("CAST(AVG(processing_ms) AS DOUBLE PRECISION)"),
                "avg_ms",
            )
            .into_tuple::<Option<f64>>()
            .one(&self.conn)
            .await?
            .flatten();

        let by_question_type = QueryEntity::find()
            .select_only()
            .column(QueryColumn::QuestionType)
            .column_as(Expr::col(QueryColumn::Id).count(), "n")
            .group_by(QueryColumn::QuestionType)
            .into_tuple::<(String, i64)>()
            .all(&self.conn)
            .await?
            .into_iter()
            .collect();

        let claude = QueryEntity::find()
            .filter(QueryColumn::ClaudeSuccess.eq(true))
            .count(&self.conn)
            .await?;
        let gemini = QueryEntity::find()
            .filter(QueryColumn::GeminiSuccess.eq(true))
            .count(&self.conn)
            .await?;

        let success_rate = if total_queries == 0 {
            0.0
        } else {
            successful_queries as f64 / total_queries as f64 * 100.0
        };

        Ok(HistoryStats {
            total_queries,
            successful_queries,
            success_rate,
            average_processing_ms,
            by_question_type,
            provider_success: ProviderSuccessCounts { claude, gemini },
        })
    }

    /// Delete every record, returning how many were removed
    pub async fn clear(&self) -> Result<u64> {
        let result = QueryEntity::delete_many().exec(&self.conn).await?;
        info!(rows = result.rows_affected, "Query history cleared");
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> QueryHistory {
        let config = DatabaseConfig {
            url: "sqlite::memory:".into(),
            max_connections: 1,
            min_connections: 1,
            ..DatabaseConfig::default()
        };
        QueryHistory::connect(&config).await.unwrap()
    }

    fn record(question: &str, question_type: QuestionType, claude: bool, gemini: bool, ms: u64) -> NewQueryRecord {
        NewQueryRecord {
            question: question.into(),
            question_type,
            answer: "answer".into(),
            processing_ms: ms,
            success: true,
            claude_success: claude,
            gemini_success: gemini,
            claude_model: claude.then(|| "claude-3-haiku-20240307".into()),
            gemini_model: gemini.then(|| "gemini-1.5-flash".into()),
            data_sources_count: 3,
            real_data_used: true,
        }
    }

    #[tokio::test]
    async fn test_store_and_recent() {
        let store = memory_store().await;
        store.ping().await.unwrap();

        let first = store.store(record("one", QuestionType::Custom, true, true, 100)).await.unwrap();
        let second = store.store(record("two", QuestionType::Preset, true, false, 300)).await.unwrap();

        let recent = store.recent(10, 0).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, second);
        assert_eq!(recent[1].id, first);
        assert_eq!(recent[0].question_type, "preset");
        assert_eq!(recent[0].gemini_model, None);

        let page = store.recent(1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, first);
    }

    #[tokio::test]
    async fn test_popular_and_stats() {
        let store = memory_store().await;
        for _ in 0..3 {
            store.store(record("rates?", QuestionType::Custom, true, true, 200)).await.unwrap();
        }
        store.store(record("growth?", QuestionType::Preset, false, true, 400)).await.unwrap();

        let popular = store.popular_questions(5).await.unwrap();
        assert_eq!(popular[0], ("rates?".to_string(), 3));
        assert_eq!(popular[1], ("growth?".to_string(), 1));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_queries, 4);
        assert_eq!(stats.successful_queries, 4);
        assert_eq!(stats.success_rate, 100.0);
        assert_eq!(stats.average_processing_ms, Some(250.0));
        assert_eq!(stats.by_question_type.get("custom"), Some(&3));
        assert_eq!(stats.provider_success, ProviderSuccessCounts { claude: 3, gemini: 4 });
    }

    #[tokio::test]
    async fn test_clear() {
        let store = memory_store().await;
        store.store(record("q", QuestionType::Custom, true, true, 1)).await.unwrap();
        store.store(record("q", QuestionType::Custom, true, true, 1)).await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_queries, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.average_processing_ms, None);
    }
}
