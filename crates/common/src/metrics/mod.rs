//! Metrics and observability utilities
//!
//! Prometheus-style metrics with a shared prefix. Recording is a no-op until
//! the gateway installs an exporter, so the helpers are safe to call from
//! tests and library code.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all PropIntel metrics
pub const METRICS_PREFIX: &str = "propintel";

/// Histogram buckets for HTTP request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 30.00, 60.00,
];

/// Buckets for provider calls; LLM round trips run for seconds
pub const PROVIDER_BUCKETS: &[f64] = &[
    0.250, // 250ms
    0.500,
    1.000,
    2.000,
    5.000,
    10.00,
    20.00,
    30.00, // default call timeout
    60.00,
];

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "error"
    }
}

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    describe_counter!(
        format!("{}_analyses_total", METRICS_PREFIX),
        Unit::Count,
        "Property analyses by outcome"
    );

    describe_histogram!(
        format!("{}_analysis_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end analysis latency in seconds"
    );

    describe_counter!(
        format!("{}_provider_calls_total", METRICS_PREFIX),
        Unit::Count,
        "LLM provider calls by provider and outcome"
    );

    describe_histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "LLM provider call latency in seconds"
    );

    describe_counter!(
        format!("{}_feed_fetches_total", METRICS_PREFIX),
        Unit::Count,
        "RSS feed fetches by feed and outcome"
    );

    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record one finished analysis.
///
/// `degraded` is set when neither provider produced text and the answer
/// came from the fallback generator.
pub fn record_analysis(duration_secs: f64, question_type: &str, success: bool, degraded: bool) {
    let result = match (success, degraded) {
        (false, _) => "error",
        (true, true) => "fallback",
        (true, false) => "success",
    };

    counter!(
        format!("{}_analyses_total", METRICS_PREFIX),
        "question_type" => question_type.to_string(),
        "outcome" => result
    )
    .increment(1);

    histogram!(format!("{}_analysis_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record one provider invocation (after retries)
pub fn record_provider_call(provider: &str, success: bool, duration_secs: f64) {
    counter!(
        format!("{}_provider_calls_total", METRICS_PREFIX),
        "provider" => provider.to_string(),
        "outcome" => outcome(success)
    )
    .increment(1);

    histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        "provider" => provider.to_string()
    )
    .record(duration_secs);
}

/// Record one RSS feed fetch
pub fn record_feed_fetch(feed: &str, success: bool) {
    counter!(
        format!("{}_feed_fetches_total", METRICS_PREFIX),
        "feed" => feed.to_string(),
        "outcome" => outcome(success)
    )
    .increment(1);
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    let name = if hit {
        format!("{}_cache_hits_total", METRICS_PREFIX)
    } else {
        format!("{}_cache_misses_total", METRICS_PREFIX)
    };
    counter!(name, "cache" => cache_name.to_string()).increment(1);
}
