//! RSS-backed news service with a per-feed TTL cache

use super::parser::{parse_feed, parse_pub_date, strip_html};
use super::{FeedStatus, FeedStatusReport, NewsSource};
use crate::config::{FeedConfig, NewsConfig};
use crate::context::{sort_newest_first, ContextSource, Relevance};
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

struct CachedFeed {
    items: Vec<ContextSource>,
    fetched_at: Instant,
}

#[derive(Default)]
struct FeedHealth {
    last_fetch: Option<DateTime<Utc>>,
    item_count: usize,
    last_error: Option<String>,
}

pub struct RssNewsService {
    client: reqwest::Client,
    feeds: Vec<FeedConfig>,
    region_keywords: Vec<String>,
    summary_chars: usize,
    ttl: Duration,
    cache: RwLock<HashMap<String, CachedFeed>>,
    health: RwLock<HashMap<String, FeedHealth>>,
    /// One download in flight per feed; keyed by feed url
    fetch_locks: HashMap<String, Mutex<()>>,
}

impl RssNewsService {
    pub fn new(config: &NewsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("propintel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            feeds: config.feeds.clone(),
            region_keywords: config.region_keywords.iter().map(|k| k.to_lowercase()).collect(),
            summary_chars: config.summary_chars,
            ttl: Duration::from_secs(config.cache_ttl_secs),
            cache: RwLock::new(HashMap::new()),
            health: RwLock::new(HashMap::new()),
            fetch_locks: config
                .feeds
                .iter()
                .map(|feed| (feed.url.clone(), Mutex::new(())))
                .collect(),
        })
    }

    /// Whether `text` mentions one of the configured region keywords
    pub fn mentions_region(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.region_keywords.iter().any(|k| lower.contains(k.as_str()))
    }

    async fn cached(&self, feed: &FeedConfig) -> Option<Vec<ContextSource>> {
        let cache = self.cache.read().await;
        let entry = cache.get(&feed.url)?;
        (entry.fetched_at.elapsed() < self.ttl).then(|| entry.items.clone())
    }

    /// Items for one feed, from cache when fresh.
    ///
    /// Concurrent misses on the same feed wait for a single download and then
    /// read its result from the cache.
    async fn feed_items(&self, feed: &FeedConfig) -> Result<Vec<ContextSource>> {
        if let Some(items) = self.cached(feed).await {
            metrics::record_cache(true, "news");
            debug!(feed = %feed.name, "Feed cache hit");
            return Ok(items);
        }

        let _guard = match self.fetch_locks.get(&feed.url) {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };
        if let Some(items) = self.cached(feed).await {
            metrics::record_cache(true, "news");
            debug!(feed = %feed.name, "Feed filled by a concurrent fetch");
            return Ok(items);
        }
        metrics::record_cache(false, "news");

        let outcome = self.download(feed).await;
        metrics::record_feed_fetch(&feed.name, outcome.is_ok());

        let mut health = self.health.write().await;
        let status = health.entry(feed.url.clone()).or_default();
        status.last_fetch = Some(Utc::now());

        match outcome {
            Ok(items) => {
                info!(feed = %feed.name, items = items.len(), "Feed fetched");
                status.item_count = items.len();
                status.last_error = None;
                drop(health);

                self.cache.write().await.insert(
                    feed.url.clone(),
                    CachedFeed {
                        items: items.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                Ok(items)
            }
            Err(e) => {
                warn!(feed = %feed.name, error = %e, "Feed fetch failed");
                status.item_count = 0;
                status.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn download(&self, feed: &FeedConfig) -> Result<Vec<ContextSource>> {
        let response = self.client.get(&feed.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::ContextUnavailable {
                message: format!("{} returned {}", feed.name, status),
            });
        }

        let body = response.text().await?;
        let items = parse_feed(&body).map_err(|message| AppError::ContextUnavailable {
            message: format!("{}: {}", feed.name, message),
        })?;

        Ok(self.convert(feed, items))
    }

    /// Keyword-filter raw items and turn them into context records
    fn convert(&self, feed: &FeedConfig, items: Vec<super::FeedItem>) -> Vec<ContextSource> {
        let keywords: Vec<String> = feed.keywords.iter().map(|k| k.to_lowercase()).collect();

        items
            .into_iter()
            .filter(|item| !item.title.trim().is_empty())
            .filter_map(|item| {
                let summary = strip_html(&item.description);
                let haystack = format!("{} {}", item.title, summary).to_lowercase();
                if !keywords.is_empty() && !keywords.iter().any(|k| haystack.contains(k.as_str())) {
                    return None;
                }

                let relevance = if self.mentions_region(&haystack) {
                    Relevance::High
                } else {
                    Relevance::Medium
                };

                Some(ContextSource::genuine(
                    feed.name.clone(),
                    strip_html(&item.title),
                    &summary,
                    item.link.trim(),
                    item.pub_date.trim(),
                    parse_pub_date(&item.pub_date),
                    relevance,
                    self.summary_chars,
                ))
            })
            .collect()
    }

    /// Per-feed health for the status endpoints
    pub async fn feed_status(&self) -> FeedStatusReport {
        let health = self.health.read().await;
        let cache = self.cache.read().await;

        let feeds: Vec<FeedStatus> = self
            .feeds
            .iter()
            .map(|feed| {
                let entry = health.get(&feed.url);
                FeedStatus {
                    name: feed.name.clone(),
                    url: feed.url.clone(),
                    last_fetch: entry.and_then(|h| h.last_fetch),
                    item_count: entry.map(|h| h.item_count).unwrap_or(0),
                    last_error: entry.and_then(|h| h.last_error.clone()),
                    cached: cache
                        .get(&feed.url)
                        .is_some_and(|c| c.fetched_at.elapsed() < self.ttl),
                }
            })
            .collect();

        FeedStatusReport {
            total_feeds: feeds.len(),
            active_feeds: feeds
                .iter()
                .filter(|f| f.last_fetch.is_some() && f.last_error.is_none())
                .count(),
            cache_ttl_secs: self.ttl.as_secs(),
            feeds,
        }
    }

    /// Drop every cached feed so the next fetch goes to the network
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        let dropped = cache.len();
        cache.clear();
        info!(dropped, "News cache cleared");
    }
}

/// Merge feed results: dedupe by link, newest first, optional region narrowing
fn select(mut items: Vec<ContextSource>, region_focus: bool, max_items: usize) -> Vec<ContextSource> {
    let mut seen = HashSet::new();
    items.retain(|item| item.link.is_empty() || seen.insert(item.link.clone()));
    sort_newest_first(&mut items);

    if region_focus && items.iter().any(|i| i.is_high_relevance()) {
        items.retain(|i| i.is_high_relevance());
    }

    items.truncate(max_items);
    items
}

#[async_trait]
impl NewsSource for RssNewsService {
    #[instrument(skip(self, query))]
    async fn fetch(&self, query: &str, region_focus: bool, max_items: usize) -> Result<Vec<ContextSource>> {
        let results = join_all(self.feeds.iter().map(|feed| self.feed_items(feed))).await;

        let mut items = Vec::new();
        let mut failures = 0;
        for result in results {
            match result {
                Ok(feed_items) => items.extend(feed_items),
                Err(_) => failures += 1,
            }
        }

        if failures > 0 && failures == self.feeds.len() {
            warn!(feeds = failures, "All news feeds failed");
        }

        let selected = select(items, region_focus, max_items);
        debug!(query_chars = query.len(), returned = selected.len(), "News items selected");
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const FEED: &str = r#"<rss version="2.0"><channel><title>Test</title>
<item><title>Brisbane apartment approvals surge</title><link>https://example.com/1</link>
<description>Queensland planning data shows growth</description><pubDate>Mon, 03 Jun 2024 09:00:00 +1000</pubDate></item>
<item><title>Sydney auction clearance rates</title><link>https://example.com/2</link>
<description>Property auctions steady</description><pubDate>Tue, 04 Jun 2024 09:00:00 +1000</pubDate></item>
<item><title>Celebrity gossip</title><link>https://example.com/3</link>
<description>Nothing relevant</description><pubDate>Wed, 05 Jun 2024 09:00:00 +1000</pubDate></item>
</channel></rss>"#;

    fn config(url: String) -> NewsConfig {
        NewsConfig {
            feeds: vec![FeedConfig {
                name: "Test Feed".into(),
                url,
                keywords: vec!["property".into(), "apartment".into(), "auction".into()],
            }],
            ..NewsConfig::default()
        }
    }

    /// Serve FEED on an ephemeral port, counting requests
    async fn serve_feed() -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/feed",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    FEED
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/feed", addr), hits)
    }

    fn item(link: &str, at: Option<i64>, relevance: Relevance) -> ContextSource {
        ContextSource::genuine("feed", link, "", link, "", at, relevance, 300)
    }

    #[test]
    fn test_select_dedupes_and_orders() {
        let items = vec![
            item("a", Some(1), Relevance::Medium),
            item("b", Some(3), Relevance::Medium),
            item("a", Some(1), Relevance::Medium),
            item("c", None, Relevance::Medium),
        ];
        let links: Vec<_> = select(items, false, 10).into_iter().map(|i| i.link).collect();
        assert_eq!(links, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_select_region_focus() {
        let items = vec![
            item("a", Some(1), Relevance::High),
            item("b", Some(3), Relevance::Medium),
        ];
        let focused = select(items.clone(), true, 10);
        assert_eq!(focused.len(), 1);
        assert_eq!(focused[0].link, "a");

        // No regional items: fall back to the general list
        let general: Vec<_> = items.into_iter().filter(|i| !i.is_high_relevance()).collect();
        assert_eq!(select(general, true, 10).len(), 1);
    }

    #[test]
    fn test_select_honours_max_items() {
        let items = (0..10).map(|n| item(&n.to_string(), Some(n), Relevance::Medium)).collect();
        assert_eq!(select(items, false, 3).len(), 3);
    }

    #[tokio::test]
    async fn test_fetch_filters_and_caches() {
        let (url, hits) = serve_feed().await;
        let service = RssNewsService::new(&config(url)).unwrap();

        let items = service.fetch("market", false, 8).await.unwrap();
        assert_eq!(items.len(), 2);
        // Newest first; the off-topic item is filtered out
        assert_eq!(items[0].title, "Sydney auction clearance rates");
        assert_eq!(items[1].relevance, Relevance::High);
        assert!(items.iter().all(|i| i.real_data));

        let regional = service.fetch("brisbane", true, 6).await.unwrap();
        assert_eq!(regional.len(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let status = service.feed_status().await;
        assert_eq!(status.active_feeds, 1);
        assert_eq!(status.feeds[0].item_count, 2);
        assert!(status.feeds[0].cached);

        service.clear_cache().await;
        service.fetch("market", false, 8).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_download() {
        let (url, hits) = serve_feed().await;
        let service = RssNewsService::new(&config(url)).unwrap();

        let results = join_all((0..5).map(|_| service.fetch("market", false, 8))).await;
        for items in results {
            assert_eq!(items.unwrap().len(), 2);
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreachable_feed_yields_empty() {
        let service = RssNewsService::new(&config("http://127.0.0.1:1/feed".into())).unwrap();
        let items = service.fetch("market", false, 8).await.unwrap();
        assert!(items.is_empty());

        let status = service.feed_status().await;
        assert_eq!(status.active_feeds, 0);
        assert!(status.feeds[0].last_error.is_some());
        assert!(!status.feeds[0].cached);
    }
}
