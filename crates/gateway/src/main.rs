//! PropIntel API Gateway
//!
//! The HTTP entry point for property analysis.
//! Handles:
//! - Wiring the providers, news feeds, history store and pipeline at startup
//! - Rate limiting of analysis requests
//! - Request routing
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;
mod routes;


use anyhow::Context;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use propintel_common::{
    config::{AppConfig, ObservabilityConfig},
    db::QueryHistory,
    metrics::{self, LATENCY_BUCKETS, METRICS_PREFIX, PROVIDER_BUCKETS},
    news::{NewsSource, RssNewsService},
    pipeline::{AnalyzerSettings, PropertyAnalyzer},
    providers::ProviderGateway,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub analyzer: Arc<PropertyAnalyzer>,
    /// Absent when the database could not be reached at startup
    pub history: Option<QueryHistory>,
    pub news: Option<Arc<RssNewsService>>,
    pub started_at: Instant,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.observability);

    info!(version = propintel_common::VERSION, "Starting PropIntel API Gateway");

    for issue in config.validate() {
        warn!(issue = %issue, "Configuration issue");
    }
    config.log_status();

    let config = Arc::new(config);

    // Initialize metrics
    metrics::register_metrics();
    if config.observability.metrics_port != 0 {
        install_metrics_exporter(config.observability.metrics_port)?;
    }

    // Query history is optional; analysis keeps working without it
    let history = match QueryHistory::connect(&config.database).await {
        Ok(history) => Some(history),
        Err(e) => {
            error!(error = %e, "Query history unavailable, continuing without persistence");
            None
        }
    };

    let news = if config.news.enabled {
        match RssNewsService::new(&config.news) {
            Ok(service) => Some(Arc::new(service)),
            Err(e) => {
                error!(error = %e, "News service unavailable");
                None
            }
        }
    } else {
        info!("News feeds disabled");
        None
    };

    info!("Probing LLM providers...");
    let gateway = ProviderGateway::from_config(&config).await?;
    let available = gateway.available_providers();
    if available.is_empty() {
        warn!("No LLM provider available, answers will use the fallback generator");
    } else {
        info!(providers = ?available, "LLM providers ready");
    }

    let analyzer = PropertyAnalyzer::new(
        Arc::new(gateway),
        news.clone().map(|n| n as Arc<dyn NewsSource>),
        AnalyzerSettings::from_config(&config),
    );

    let state = AppState {
        config: config.clone(),
        analyzer: Arc::new(analyzer),
        history,
        news,
        started_at: Instant::now(),
    };

    // Build the router
    let app = routes::create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Structured logging; `RUST_LOG` overrides the configured level
fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_request_duration_seconds", METRICS_PREFIX)),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full(format!("{}_provider_duration_seconds", METRICS_PREFIX)),
            PROVIDER_BUCKETS,
        )?
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(port, "Prometheus exporter listening");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
