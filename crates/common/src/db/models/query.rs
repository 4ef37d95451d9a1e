//! Property query entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One analysed question with the outcome of each pipeline stage
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "property_queries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub question: String,

    /// `preset` or `custom`
    pub question_type: String,

    #[sea_orm(column_type = "Text")]
    pub answer: String,

    pub processing_ms: i64,

    pub success: bool,

    /// Provider outcomes as observed by the pipeline
    pub claude_success: bool,

    pub gemini_success: bool,

    #[sea_orm(nullable)]
    pub claude_model: Option<String>,

    #[sea_orm(nullable)]
    pub gemini_model: Option<String>,

    pub data_sources_count: i32,

    pub real_data_used: bool,

    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
