//! Configuration management for PropIntel services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Legacy bare variables (CLAUDE_API_KEY, GEMINI_API_KEY, ...)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::providers::{GatewaySettings, ProviderId, MAX_ATTEMPTS};

/// Headroom on top of the worst-case analysis time
const ANALYSIS_MARGIN: Duration = Duration::from_secs(5);

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Query history database configuration
    pub database: DatabaseConfig,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// News feed configuration
    pub news: NewsConfig,

    /// Analysis pipeline configuration
    pub analysis: AnalysisConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Whole-request timeout in seconds; raised to the analysis budget when lower
    pub request_timeout_secs: u64,

    /// Allowed CORS origins ("*" allows any)
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database URL (sqlite:// or postgres://)
    pub url: String,

    /// Maximum number of connections
    pub max_connections: u32,

    /// Minimum number of connections
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    pub idle_timeout_secs: u64,
}

/// Settings for a single text-generation provider
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    pub enabled: bool,

    /// API key; absent means the provider is never initialized
    pub api_key: Option<String>,

    pub base_url: String,

    /// Candidate models in priority order
    pub models: Vec<String>,
}

impl ProviderConfig {
    /// Whether a non-blank API key is configured
    pub fn has_credentials(&self) -> bool {
        self.api_key
            .as_deref()
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmConfig {
    pub claude: ProviderConfig,

    pub gemini: ProviderConfig,

    /// Per-call timeout in seconds
    pub timeout_secs: u64,

    /// Attempts per provider call
    pub max_retries: u32,

    /// Output budget for the strategic (first) pass
    pub strategic_max_tokens: u32,

    /// Output budget for the comprehensive (second) pass
    pub comprehensive_max_tokens: u32,
}

/// A single RSS feed
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    /// Items must mention one of these (empty keeps every item)
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NewsConfig {
    pub enabled: bool,

    pub feeds: Vec<FeedConfig>,

    /// How long a fetched feed stays fresh
    pub cache_ttl_secs: u64,

    /// Per-feed HTTP timeout
    pub timeout_secs: u64,

    /// Keywords that narrow a question to the regional feed view
    pub region_keywords: Vec<String>,

    pub general_max_items: usize,

    pub region_max_items: usize,

    /// Character budget for article summaries
    pub summary_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Questions classified as `preset` (exact match)
    pub preset_questions: Vec<String>,

    /// Sources rendered into the model prompt
    pub context_sources_cap: usize,

    /// Sources listed in the final answer
    pub display_sources_cap: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    pub log_level: String,

    /// Enable JSON logging
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    pub metrics_port: u16,

    /// Service name for logs
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Analyze requests per second
    pub requests_per_second: u32,

    /// Burst capacity
    pub burst: u32,

    /// Enable rate limiting
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            request_timeout_secs: 240,
            cors_origins: vec![
                "https://curam-ai.com.au".to_string(),
                "https://curam-ai.com.au/python-hub/".to_string(),
                "https://curam-ai.com.au/python-hub-v2/".to_string(),
                "https://curam-ai.com.au/ai-intelligence/".to_string(),
                "http://localhost:3000".to_string(),
                "http://localhost:8000".to_string(),
            ],
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://property_intelligence.db?mode=rwc".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 10,
            idle_timeout_secs: 300,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            claude: ProviderConfig {
                enabled: true,
                api_key: None,
                base_url: "https://api.anthropic.com".to_string(),
                models: vec![
                    "claude-3-5-sonnet-20241022".to_string(),
                    "claude-3-haiku-20240307".to_string(),
                    "claude-3-sonnet-20240229".to_string(),
                ],
            },
            gemini: ProviderConfig {
                enabled: true,
                api_key: None,
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                models: vec![
                    "gemini-1.5-flash".to_string(),
                    "gemini-1.5-pro".to_string(),
                    "gemini-pro".to_string(),
                ],
            },
            timeout_secs: 30,
            max_retries: 3,
            strategic_max_tokens: 1000,
            comprehensive_max_tokens: 1500,
        }
    }
}

impl Default for NewsConfig {
    fn default() -> Self {
        let property_keywords = || {
            ["property", "housing", "development", "planning", "infrastructure", "zoning", "market"]
                .iter()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
        };

        Self {
            enabled: true,
            feeds: vec![
                FeedConfig {
                    name: "RealEstate.com.au News".to_string(),
                    url: "https://www.realestate.com.au/news/feed/".to_string(),
                    keywords: Vec::new(),
                },
                FeedConfig {
                    name: "Smart Property Investment".to_string(),
                    url: "https://www.smartpropertyinvestment.com.au/rss".to_string(),
                    keywords: Vec::new(),
                },
                FeedConfig {
                    name: "Brisbane City Council".to_string(),
                    url: "https://www.brisbane.qld.gov.au/about-council/news-media/news/rss".to_string(),
                    keywords: property_keywords(),
                },
            ],
            cache_ttl_secs: 1800,
            timeout_secs: 10,
            region_keywords: ["brisbane", "queensland", "qld", "gold coast", "sunshine coast"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            general_max_items: 8,
            region_max_items: 6,
            summary_chars: 300,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            preset_questions: vec![
                "What new development applications were submitted in Brisbane this month?".to_string(),
                "Which Brisbane suburbs are trending in property news?".to_string(),
                "Are there any major infrastructure projects affecting property values?".to_string(),
                "What zoning changes have been approved recently?".to_string(),
                "Which areas have the most development activity?".to_string(),
            ],
            context_sources_cap: 6,
            display_sources_cap: 5,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: true,
            metrics_port: 0,
            service_name: "propintel".to_string(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5,
            burst: 10,
            enabled: true,
        }
    }
}

/// Bare variable names kept from the original deployment, mapped to config keys
const LEGACY_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("CLAUDE_API_KEY", "llm.claude.api_key"),
    ("GEMINI_API_KEY", "llm.gemini.api_key"),
    ("CLAUDE_ENABLED", "llm.claude.enabled"),
    ("GEMINI_ENABLED", "llm.gemini.enabled"),
    ("LLM_TIMEOUT", "llm.timeout_secs"),
    ("LLM_MAX_RETRIES", "llm.max_retries"),
    ("DATABASE_URL", "database.url"),
    ("PORT", "server.port"),
];

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let mut builder = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&AppConfig::default())?)
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in LEGACY_ENV_OVERRIDES {
            let value = std::env::var(var).ok().map(|v| v.trim().to_string());
            builder = builder.set_override_option(*key, value.filter(|v| !v.is_empty()))?;
        }

        builder.build()?.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Provider section for the given provider
    pub fn provider(&self, id: ProviderId) -> &ProviderConfig {
        match id {
            ProviderId::Claude => &self.llm.claude,
            ProviderId::Gemini => &self.llm.gemini,
        }
    }

    /// Providers that are both enabled and keyed
    pub fn enabled_providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|id| {
                let provider = self.provider(*id);
                provider.enabled && provider.has_credentials()
            })
            .collect()
    }

    /// Collect configuration problems; none of them prevent startup
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        for id in ProviderId::ALL {
            let provider = self.provider(id);
            if provider.enabled && !provider.has_credentials() {
                issues.push(format!("{} API key missing but {} is enabled", id.env_prefix(), id.display_name()));
            }
            if provider.enabled && provider.models.is_empty() {
                issues.push(format!("{} is enabled but has no candidate models", id.display_name()));
            }
        }

        if !self.llm.claude.enabled && !self.llm.gemini.enabled {
            issues.push("No LLM providers enabled".to_string());
        }

        if self.llm.timeout_secs < 5 {
            issues.push("LLM timeout too low (minimum 5 seconds)".to_string());
        }

        if self.llm.max_retries > MAX_ATTEMPTS {
            issues.push(format!(
                "LLM max retries {} above {}, clamped",
                self.llm.max_retries, MAX_ATTEMPTS
            ));
        }

        let budget = self.analysis_budget();
        if Duration::from_secs(self.server.request_timeout_secs) < budget {
            issues.push(format!(
                "Request timeout {}s below the worst-case analysis time {}s, using the latter",
                self.server.request_timeout_secs,
                budget.as_secs_f64().ceil()
            ));
        }

        issues
    }

    /// Log a configuration summary without secrets
    pub fn log_status(&self) {
        tracing::info!(
            claude_enabled = self.llm.claude.enabled,
            claude_key = self.llm.claude.has_credentials(),
            gemini_enabled = self.llm.gemini.enabled,
            gemini_key = self.llm.gemini.has_credentials(),
            llm_timeout_secs = self.llm.timeout_secs,
            database = %redact_url(&self.database.url),
            feeds = self.news.feeds.len(),
            enabled_providers = ?self.enabled_providers(),
            "Configuration status"
        );
    }

    /// Get LLM call timeout as Duration
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    /// Worst-case time for one analysis: both provider calls with every
    /// retry, plus the news fetch
    pub fn analysis_budget(&self) -> Duration {
        let news = if self.news.enabled {
            Duration::from_secs(self.news.timeout_secs)
        } else {
            Duration::ZERO
        };

        GatewaySettings::from_config(self)
            .call_budget()
            .saturating_mul(2)
            .saturating_add(news)
            .saturating_add(ANALYSIS_MARGIN)
    }

    /// Whole-request timeout, never shorter than the analysis budget
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs).max(self.analysis_budget())
    }
}

/// Strip credentials from a connection URL for logging
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.llm.claude.models[0], "claude-3-5-sonnet-20241022");
        assert_eq!(config.llm.gemini.models[0], "gemini-1.5-flash");
        assert_eq!(config.analysis.preset_questions.len(), 5);
    }

    #[test]
    fn test_enabled_providers_require_keys() {
        let mut config = AppConfig::default();
        assert!(config.enabled_providers().is_empty());

        config.llm.gemini.api_key = Some("key".into());
        assert_eq!(config.enabled_providers(), vec![ProviderId::Gemini]);

        config.llm.claude.api_key = Some("   ".into());
        assert_eq!(config.enabled_providers(), vec![ProviderId::Gemini]);
    }

    #[test]
    fn test_validate_reports_issues() {
        let mut config = AppConfig::default();
        config.llm.timeout_secs = 2;
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.contains("CLAUDE API key missing")));
        assert!(issues.iter().any(|i| i.contains("timeout too low")));

        config.llm.claude.enabled = false;
        config.llm.gemini.enabled = false;
        assert!(config.validate().iter().any(|i| i == "No LLM providers enabled"));
    }

    #[test]
    fn test_request_timeout_covers_analysis_budget() {
        let mut config = AppConfig::default();
        let budget = config.analysis_budget();
        // 2 x (3 x 30s + 0.75s backoff) + 10s news + 5s margin
        assert!(budget >= Duration::from_millis(196_500) && budget < Duration::from_millis(196_501));
        assert_eq!(config.request_timeout(), Duration::from_secs(240));
        assert!(!config.validate().iter().any(|i| i.contains("Request timeout")));

        config.server.request_timeout_secs = 120;
        assert_eq!(config.request_timeout(), budget);
        assert!(config.validate().iter().any(|i| i.contains("Request timeout 120s")));
    }

    #[test]
    fn test_max_retries_are_clamped() {
        let mut config = AppConfig::default();
        config.llm.max_retries = 40;
        assert!(config.validate().iter().any(|i| i.contains("max retries 40")));
        assert_eq!(GatewaySettings::from_config(&config).max_attempts, MAX_ATTEMPTS);
        // The budget follows the clamped value, so it stays finite
        assert!(config.analysis_budget() < Duration::from_secs(20 * 60));

        config.llm.max_retries = 0;
        assert_eq!(GatewaySettings::from_config(&config).max_attempts, 1);
    }

    #[test]
    fn test_redact_url() {
        assert_eq!(redact_url("postgres://user:pw@db:5432/x"), "postgres://***@db:5432/x");
        assert_eq!(redact_url("sqlite://local.db"), "sqlite://local.db");
    }
}
