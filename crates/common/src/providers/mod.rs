//! Text-generation providers
//!
//! Provides:
//! - A provider abstraction (`LlmProvider`) with Claude and Gemini clients
//! - The per-call `ProviderResult` record
//! - `ProviderGateway`, which freezes a working model per provider at
//!   startup and turns every call failure into a failed result

mod anthropic;
mod gateway;
mod gemini;

pub use anthropic::AnthropicProvider;
pub use gateway::{
    AvailabilityReport, GatewaySettings, ProviderAvailability, ProviderGateway,
    ProviderRegistration, MAX_ATTEMPTS, MAX_RETRY_DELAY,
};
pub use gemini::GeminiProvider;

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identity of one of the two providers, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Strategic pass (runs first)
    Claude,
    /// Comprehensive pass (runs second, chained on Claude's output)
    Gemini,
}

impl ProviderId {
    pub const ALL: [ProviderId; 2] = [ProviderId::Claude, ProviderId::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Claude => "claude",
            ProviderId::Gemini => "gemini",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::Claude => "Claude",
            ProviderId::Gemini => "Gemini",
        }
    }

    /// Prefix of the legacy environment variables for this provider
    pub fn env_prefix(&self) -> &'static str {
        match self {
            ProviderId::Claude => "CLAUDE",
            ProviderId::Gemini => "GEMINI",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// A text-generation backend
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Which provider this client talks to
    fn id(&self) -> ProviderId;

    /// Submit a prompt to the given model and return the generated text
    async fn generate(&self, model: &str, prompt: &str, max_tokens: u32) -> Result<String>;
}

/// Outcome of one provider invocation
///
/// Build through [`ProviderResult::succeeded`] or [`ProviderResult::failed`]
/// so that `success` always agrees with which of `text`/`error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    pub provider: ProviderId,
    pub success: bool,
    #[serde(rename = "analysis")]
    pub text: Option<String>,
    pub model_used: Option<String>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

impl ProviderResult {
    pub fn succeeded(provider: ProviderId, text: String, model: String, elapsed: Duration) -> Self {
        Self {
            provider,
            success: true,
            text: Some(text),
            model_used: Some(model),
            elapsed_ms: elapsed.as_millis() as u64,
            error: None,
        }
    }

    pub fn failed(provider: ProviderId, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            provider,
            success: false,
            text: None,
            model_used: None,
            elapsed_ms: elapsed.as_millis() as u64,
            error: Some(error.into()),
        }
    }

    /// Generated text, only when the call succeeded
    pub fn output(&self) -> Option<&str> {
        if self.success {
            self.text.as_deref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_invariants() {
        let ok = ProviderResult::succeeded(
            ProviderId::Claude,
            "analysis".into(),
            "claude-3-haiku-20240307".into(),
            Duration::from_millis(120),
        );
        assert!(ok.success && ok.text.is_some() && ok.error.is_none());
        assert_eq!(ok.output(), Some("analysis"));
        assert_eq!(ok.elapsed_ms, 120);

        let err = ProviderResult::failed(ProviderId::Gemini, "quota exceeded", Duration::ZERO);
        assert!(!err.success && err.text.is_none() && err.error.is_some());
        assert_eq!(err.output(), None);
    }

    #[test]
    fn test_provider_id_serialization() {
        assert_eq!(serde_json::to_string(&ProviderId::Claude).unwrap(), "\"claude\"");
        assert_eq!(ProviderId::Gemini.to_string(), "Gemini");
        assert_eq!(ProviderId::ALL[0], ProviderId::Claude);
    }
}
