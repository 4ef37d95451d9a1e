//! News feed collaborator
//!
//! Provides:
//! - The `NewsSource` trait consumed by the analysis pipeline
//! - `RssNewsService`, which fetches, filters and caches industry RSS feeds
//! - Feed status reporting for the health and debug endpoints

mod parser;
mod rss;

pub use parser::{parse_feed, parse_pub_date, strip_html, FeedItem};
pub use rss::RssNewsService;

use crate::context::ContextSource;
use crate::errors::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Source of contextual news records
#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Fetch at most `max_items` recent records.
    ///
    /// With `region_focus`, region-relevant records are preferred.
    async fn fetch(&self, query: &str, region_focus: bool, max_items: usize) -> Result<Vec<ContextSource>>;
}

/// Health of one configured feed
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    pub name: String,
    pub url: String,
    pub last_fetch: Option<DateTime<Utc>>,
    pub item_count: usize,
    pub last_error: Option<String>,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedStatusReport {
    pub total_feeds: usize,
    /// Feeds whose last fetch succeeded
    pub active_feeds: usize,
    pub cache_ttl_secs: u64,
    pub feeds: Vec<FeedStatus>,
}
