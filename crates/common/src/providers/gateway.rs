//! Provider gateway
//!
//! Owns the two provider slots. At startup each configured provider is
//! probed with its candidate models in order and the first one that answers
//! is frozen as the working model; the slot is read-only afterwards, so
//! concurrent requests share it without locking.

use super::{LlmProvider, ProviderId, ProviderResult};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use super::{AnthropicProvider, GeminiProvider};

/// Smoke-test prompt used to probe candidate models
const PROBE_PROMPT: &str = "Hi";
const PROBE_MAX_TOKENS: u32 = 5;

/// Attempts per invocation never exceed this, whatever the configuration says
pub const MAX_ATTEMPTS: u32 = 10;

/// Longest sleep between two attempts
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(8);

/// Call behaviour shared by both providers
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Upper bound for a single attempt
    pub timeout: Duration,
    /// Attempts per invocation (at least one)
    pub max_attempts: u32,
    /// First retry delay, doubled on each further attempt up to `MAX_RETRY_DELAY`
    pub retry_base_delay: Duration,
}

impl GatewaySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            timeout: config.llm_timeout(),
            max_attempts: config.llm.max_retries.clamp(1, MAX_ATTEMPTS),
            ..Self::default()
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.clamp(1, MAX_ATTEMPTS)
    }

    /// Deterministic doubling schedule, capped per sleep
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.retry_base_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(MAX_RETRY_DELAY)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Worst case for one `invoke`: every attempt times out and every backoff sleep is taken
    pub fn call_budget(&self) -> Duration {
        let mut backoff = self.backoff();
        let sleeps: Duration = (1..self.attempts())
            .filter_map(|_| backoff.next_backoff())
            .sum();
        self.timeout
            .saturating_mul(self.attempts())
            .saturating_add(sleeps)
    }
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(250),
        }
    }
}

/// What the gateway is told about one provider before probing
pub struct ProviderRegistration {
    pub id: ProviderId,
    pub client: Option<Arc<dyn LlmProvider>>,
    pub models: Vec<String>,
    pub enabled: bool,
    pub credential_configured: bool,
}

impl ProviderRegistration {
    /// An enabled, keyed provider with its candidate models
    pub fn ready(client: Arc<dyn LlmProvider>, models: Vec<String>) -> Self {
        Self {
            id: client.id(),
            client: Some(client),
            models,
            enabled: true,
            credential_configured: true,
        }
    }

    /// A provider that will never be called
    pub fn absent(id: ProviderId, enabled: bool, credential_configured: bool) -> Self {
        Self {
            id,
            client: None,
            models: Vec::new(),
            enabled,
            credential_configured,
        }
    }
}

struct ProviderSlot {
    id: ProviderId,
    client: Option<Arc<dyn LlmProvider>>,
    working_model: Option<String>,
    enabled: bool,
    credential_configured: bool,
}

impl ProviderSlot {
    fn is_available(&self) -> bool {
        self.client.is_some() && self.working_model.is_some()
    }
}

/// Health snapshot for one provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderAvailability {
    pub available: bool,
    pub enabled: bool,
    pub working_model: Option<String>,
    pub api_key_configured: bool,
}

/// Health snapshot for both providers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailabilityReport {
    pub claude: ProviderAvailability,
    pub gemini: ProviderAvailability,
}

impl AvailabilityReport {
    pub fn get(&self, id: ProviderId) -> &ProviderAvailability {
        match id {
            ProviderId::Claude => &self.claude,
            ProviderId::Gemini => &self.gemini,
        }
    }
}

/// Access point to both text-generation providers
pub struct ProviderGateway {
    claude: ProviderSlot,
    gemini: ProviderSlot,
    settings: GatewaySettings,
}

impl ProviderGateway {
    /// Build clients from configuration and probe them
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let settings = GatewaySettings::from_config(config);

        let mut registrations = Vec::with_capacity(ProviderId::ALL.len());
        for id in ProviderId::ALL {
            let provider = config.provider(id);
            let key = provider.api_key.as_deref().filter(|_| provider.has_credentials());

            let registration = match (provider.enabled, key) {
                (true, Some(key)) => {
                    let client: Arc<dyn LlmProvider> = match id {
                        ProviderId::Claude => Arc::new(AnthropicProvider::new(
                            key,
                            &provider.base_url,
                            settings.timeout,
                        )?),
                        ProviderId::Gemini => Arc::new(GeminiProvider::new(
                            key,
                            &provider.base_url,
                            settings.timeout,
                        )?),
                    };
                    ProviderRegistration::ready(client, provider.models.clone())
                }
                (enabled, key) => {
                    if enabled {
                        warn!(provider = %id, "API key not configured");
                    }
                    ProviderRegistration::absent(id, enabled, key.is_some())
                }
            };
            registrations.push(registration);
        }

        Ok(Self::initialize(settings, registrations).await)
    }

    /// Probe every registered provider and freeze its working model
    pub async fn initialize(settings: GatewaySettings, registrations: Vec<ProviderRegistration>) -> Self {
        let probes = registrations
            .into_iter()
            .map(|registration| Self::probe(&settings, registration));
        let mut slots = join_all(probes).await;

        let take = |slots: &mut Vec<ProviderSlot>, id: ProviderId| {
            slots
                .iter()
                .position(|s| s.id == id)
                .map(|i| slots.swap_remove(i))
                .unwrap_or(ProviderSlot {
                    id,
                    client: None,
                    working_model: None,
                    enabled: false,
                    credential_configured: false,
                })
        };

        let claude = take(&mut slots, ProviderId::Claude);
        let gemini = take(&mut slots, ProviderId::Gemini);

        Self {
            claude,
            gemini,
            settings,
        }
    }

    async fn probe(settings: &GatewaySettings, registration: ProviderRegistration) -> ProviderSlot {
        let ProviderRegistration {
            id,
            client,
            models,
            enabled,
            credential_configured,
        } = registration;

        let mut working_model = None;
        if let Some(client) = client.as_ref() {
            for model in &models {
                let attempt = tokio::time::timeout(
                    settings.timeout,
                    client.generate(model, PROBE_PROMPT, PROBE_MAX_TOKENS),
                )
                .await;

                match attempt {
                    Ok(Ok(_)) => {
                        info!(provider = %id, model = %model, "Provider initialized");
                        working_model = Some(model.clone());
                        break;
                    }
                    Ok(Err(e)) => warn!(provider = %id, model = %model, error = %e, "Model probe failed"),
                    Err(_) => warn!(provider = %id, model = %model, "Model probe timed out"),
                }
            }

            if working_model.is_none() {
                warn!(provider = %id, candidates = models.len(), "No working model found, provider unavailable");
            }
        }

        ProviderSlot {
            id,
            client: working_model.as_ref().and(client),
            working_model,
            enabled,
            credential_configured,
        }
    }

    fn slot(&self, id: ProviderId) -> &ProviderSlot {
        match id {
            ProviderId::Claude => &self.claude,
            ProviderId::Gemini => &self.gemini,
        }
    }

    /// Whether the provider has a frozen working model
    pub fn is_available(&self, id: ProviderId) -> bool {
        self.slot(id).is_available()
    }

    /// Providers that can currently be invoked, in pipeline order
    pub fn available_providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|id| self.is_available(*id))
            .collect()
    }

    /// Send a prompt to one provider; never fails, errors become a failed result
    #[instrument(skip(self, prompt), fields(provider = %id, prompt_chars = prompt.len()))]
    pub async fn invoke(&self, id: ProviderId, prompt: &str, max_tokens: u32) -> ProviderResult {
        let slot = self.slot(id);
        let (client, model) = match (slot.client.as_ref(), slot.working_model.as_ref()) {
            (Some(client), Some(model)) => (client, model),
            _ => {
                let err = AppError::ProviderUnavailable {
                    provider: id.display_name().to_string(),
                    message: "client not available".to_string(),
                };
                return ProviderResult::failed(id, err.to_string(), Duration::ZERO);
            }
        };

        let start = Instant::now();
        let outcome = self.call_with_retry(client.as_ref(), model, prompt, max_tokens).await;
        let elapsed = start.elapsed();
        metrics::record_provider_call(id.as_str(), outcome.is_ok(), elapsed.as_secs_f64());

        match outcome {
            Ok(text) => {
                info!(model = %model, latency_ms = elapsed.as_millis() as u64, "Provider call completed");
                ProviderResult::succeeded(id, text, model.clone(), elapsed)
            }
            Err(e) => {
                warn!(model = %model, error = %e, "Provider call failed");
                ProviderResult::failed(id, e.to_string(), elapsed)
            }
        }
    }

    async fn call_with_retry(
        &self,
        client: &dyn LlmProvider,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<String> {
        let max_attempts = self.settings.attempts();
        let mut backoff = self.settings.backoff();
        let mut last_error = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = backoff.next_backoff().unwrap_or(MAX_RETRY_DELAY);
                tokio::time::sleep(delay).await;
            }

            let result = match tokio::time::timeout(
                self.settings.timeout,
                client.generate(model, prompt, max_tokens),
            )
            .await
            {
                Ok(Ok(text)) if text.trim().is_empty() => Err(AppError::ProviderCallFailed {
                    provider: client.id().display_name().to_string(),
                    message: "empty response".to_string(),
                }),
                Ok(result) => result,
                Err(_) => Err(AppError::ProviderTimeout {
                    provider: client.id().display_name().to_string(),
                    timeout_ms: self.settings.timeout.as_millis() as u64,
                }),
            };

            match result {
                Ok(text) => return Ok(text),
                Err(e) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        error = %e,
                        "Provider request failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::ProviderCallFailed {
            provider: client.id().display_name().to_string(),
            message: "Unknown error after retries".to_string(),
        }))
    }

    /// Read-only health snapshot
    pub fn availability(&self) -> AvailabilityReport {
        let snapshot = |slot: &ProviderSlot| ProviderAvailability {
            available: slot.is_available(),
            enabled: slot.enabled,
            working_model: slot.working_model.clone(),
            api_key_configured: slot.credential_configured,
        };

        AvailabilityReport {
            claude: snapshot(&self.claude),
            gemini: snapshot(&self.gemini),
        }
    }
}
