//! PropIntel Common Library
//!
//! Shared code for the PropIntel gateway including:
//! - The multi-stage analysis pipeline (context, providers, formatting, fallback)
//! - The RSS news collaborator
//! - Query history persistence
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod context;
pub mod db;
pub mod errors;
pub mod fallback;
pub mod formatter;
pub mod metrics;
pub mod news;
pub mod pipeline;
pub mod providers;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::QueryHistory;
pub use errors::{AppError, Result};
pub use news::{NewsSource, RssNewsService};
pub use pipeline::{PipelineResult, PropertyAnalyzer, QuestionType};
pub use providers::{ProviderGateway, ProviderId, ProviderResult};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service name reported by the root endpoint
pub const SERVICE_NAME: &str = "Australian Property Intelligence";
