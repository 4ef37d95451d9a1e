//! Analysis pipeline
//!
//! One request walks through fixed stages:
//! classify, gather context, strategic pass (Claude), comprehensive pass
//! (Gemini, chained on the strategic output), then format. Every stage
//! degrades instead of aborting, so `analyze` always yields a result.
//!
//! The comprehensive prompt is built from the strategic result, so the two
//! provider calls are strictly sequential.

use crate::config::AppConfig;
use crate::context::{ContextBuilder, ContextSource};
use crate::errors::AppError;
use crate::fallback;
use crate::formatter::{AnswerFormatter, Compose};
use crate::metrics;
use crate::news::NewsSource;
use crate::providers::{ProviderGateway, ProviderId, ProviderResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Whether a question came from the preset list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    Preset,
    Custom,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Preset => "preset",
            QuestionType::Custom => "custom",
        }
    }
}

/// Exact-match classification against the preset list
pub fn classify(question: &str, presets: &[String]) -> QuestionType {
    if presets.iter().any(|p| p == question) {
        QuestionType::Preset
    } else {
        QuestionType::Custom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Classifying,
    GatheringContext,
    InvokingStrategic,
    InvokingComprehensive,
    Formatting,
    Done,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Stage::Classifying => "classifying",
            Stage::GatheringContext => "gathering_context",
            Stage::InvokingStrategic => "invoking_strategic",
            Stage::InvokingComprehensive => "invoking_comprehensive",
            Stage::Formatting => "formatting",
            Stage::Done => "done",
        }
    }
}

/// Per-stage summary of one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStages {
    pub claude_success: bool,
    pub gemini_success: bool,
    pub data_sources_count: usize,
    pub claude_model: Option<String>,
    pub gemini_model: Option<String>,
    pub real_data_used: bool,
}

/// Quick overview of a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub question_type: QuestionType,
    pub success: bool,
    pub providers_used: Vec<ProviderId>,
    pub data_sources_count: usize,
    pub real_data_used: bool,
    pub answer_length: usize,
    /// Sum of both provider call durations
    pub processing_time_ms: u64,
}

/// Everything one `analyze` call produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub success: bool,
    pub question: String,
    pub question_type: QuestionType,
    pub final_answer: String,
    pub processing_stages: ProcessingStages,
    pub claude_result: ProviderResult,
    pub gemini_result: ProviderResult,
    pub data_sources: Vec<ContextSource>,
    /// Wall-clock time of the whole pipeline
    pub processing_time_ms: u64,
    /// Internal fault that forced the fallback answer
    pub error: Option<String>,
}

impl PipelineResult {
    pub fn summary(&self) -> AnalysisSummary {
        let providers_used = [&self.claude_result, &self.gemini_result]
            .into_iter()
            .filter(|r| r.success)
            .map(|r| r.provider)
            .collect();

        AnalysisSummary {
            question_type: self.question_type,
            success: self.success,
            providers_used,
            data_sources_count: self.processing_stages.data_sources_count,
            real_data_used: self.processing_stages.real_data_used,
            answer_length: self.final_answer.chars().count(),
            processing_time_ms: self.claude_result.elapsed_ms + self.gemini_result.elapsed_ms,
        }
    }

    /// True when neither provider produced text
    pub fn used_fallback(&self) -> bool {
        !self.processing_stages.claude_success && !self.processing_stages.gemini_success
    }
}

/// Fixed knobs read from configuration at startup
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub preset_questions: Vec<String>,
    pub region_keywords: Vec<String>,
    pub general_max_items: usize,
    pub region_max_items: usize,
    pub strategic_max_tokens: u32,
    pub comprehensive_max_tokens: u32,
    pub context_sources_cap: usize,
    pub display_sources_cap: usize,
}

impl AnalyzerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            preset_questions: config.analysis.preset_questions.clone(),
            region_keywords: config
                .news
                .region_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            general_max_items: config.news.general_max_items,
            region_max_items: config.news.region_max_items,
            strategic_max_tokens: config.llm.strategic_max_tokens,
            comprehensive_max_tokens: config.llm.comprehensive_max_tokens,
            context_sources_cap: config.analysis.context_sources_cap,
            display_sources_cap: config.analysis.display_sources_cap,
        }
    }
}

/// Orchestrates one analysis per call; shared across requests
pub struct PropertyAnalyzer {
    gateway: Arc<ProviderGateway>,
    news: Option<Arc<dyn NewsSource>>,
    builder: ContextBuilder,
    formatter: Arc<dyn Compose>,
    settings: AnalyzerSettings,
}

impl PropertyAnalyzer {
    pub fn new(
        gateway: Arc<ProviderGateway>,
        news: Option<Arc<dyn NewsSource>>,
        settings: AnalyzerSettings,
    ) -> Self {
        Self {
            gateway,
            news,
            builder: ContextBuilder::new(settings.context_sources_cap),
            formatter: Arc::new(AnswerFormatter::new(settings.display_sources_cap)),
            settings,
        }
    }

    /// Replace the formatting stage
    pub fn with_formatter(mut self, formatter: Arc<dyn Compose>) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn gateway(&self) -> &ProviderGateway {
        &self.gateway
    }

    pub fn preset_questions(&self) -> &[String] {
        &self.settings.preset_questions
    }

    pub fn classify(&self, question: &str) -> QuestionType {
        classify(question, &self.settings.preset_questions)
    }

    /// Whether the question names one of the region keywords
    pub fn is_region_focused(&self, question: &str) -> bool {
        let lower = question.to_lowercase();
        self.settings
            .region_keywords
            .iter()
            .any(|k| lower.contains(k.as_str()))
    }

    /// Contextual records for a question; failures yield an empty list
    async fn gather(&self, question: &str) -> Vec<ContextSource> {
        let Some(news) = self.news.as_ref() else {
            debug!("No news source configured");
            return Vec::new();
        };

        let region_focus = self.is_region_focused(question);
        let max_items = if region_focus {
            self.settings.region_max_items
        } else {
            self.settings.general_max_items
        };

        match news.fetch(question, region_focus, max_items).await {
            Ok(mut sources) => {
                sources.truncate(max_items);
                info!(sources = sources.len(), region_focus, "Context gathered");
                sources
            }
            Err(e) => {
                let err = AppError::ContextUnavailable {
                    message: e.to_string(),
                };
                warn!(error = %err, "Continuing without context");
                Vec::new()
            }
        }
    }

    /// Run the full pipeline. Never fails.
    #[instrument(skip(self, question), fields(question_chars = question.len()))]
    pub async fn analyze(&self, question: &str) -> PipelineResult {
        let start = Instant::now();
        let mut stage = Stage::Classifying;
        debug!(stage = stage.as_str());
        let question_type = self.classify(question);

        stage = Stage::GatheringContext;
        debug!(stage = stage.as_str());
        let sources = self.gather(question).await;
        let real_data_used = sources.iter().any(|s| s.real_data);
        let context = self.builder.build(&sources, Utc::now());

        stage = Stage::InvokingStrategic;
        debug!(stage = stage.as_str());
        let strategic_prompt = self.builder.strategic_prompt(question, &context);
        let claude = self
            .gateway
            .invoke(ProviderId::Claude, &strategic_prompt, self.settings.strategic_max_tokens)
            .await;

        stage = Stage::InvokingComprehensive;
        debug!(stage = stage.as_str(), claude_success = claude.success);
        let chained_prompt = self.builder.chain(question, &context, claude.output());
        let gemini = self
            .gateway
            .invoke(ProviderId::Gemini, &chained_prompt, self.settings.comprehensive_max_tokens)
            .await;

        stage = Stage::Formatting;
        debug!(stage = stage.as_str(), gemini_success = gemini.success);
        let (success, final_answer, error) = if claude.output().is_none() && gemini.output().is_none() {
            warn!("No provider produced text, using fallback answer");
            (true, fallback::generate(question), None)
        } else {
            match self
                .formatter
                .compose(question, &claude, &gemini, &sources, Utc::now())
            {
                Ok(answer) => (true, answer, None),
                Err(e) => {
                    error!(error = %e, "Answer formatting failed");
                    (false, fallback::generate(question), Some(e.to_string()))
                }
            }
        };

        let processing_stages = ProcessingStages {
            claude_success: claude.success,
            gemini_success: gemini.success,
            data_sources_count: sources.len(),
            claude_model: claude.model_used.clone(),
            gemini_model: gemini.model_used.clone(),
            real_data_used,
        };

        let elapsed = start.elapsed();
        let result = PipelineResult {
            success,
            question: question.to_string(),
            question_type,
            final_answer,
            processing_stages,
            claude_result: claude,
            gemini_result: gemini,
            data_sources: sources,
            processing_time_ms: elapsed.as_millis() as u64,
            error,
        };

        stage = Stage::Done;
        metrics::record_analysis(
            elapsed.as_secs_f64(),
            question_type.as_str(),
            result.success,
            result.used_fallback(),
        );
        info!(
            stage = stage.as_str(),
            question_type = question_type.as_str(),
            success = result.success,
            claude_success = result.processing_stages.claude_success,
            gemini_success = result.processing_stages.gemini_success,
            sources = result.processing_stages.data_sources_count,
            latency_ms = result.processing_time_ms,
            "Analysis completed"
        );

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Relevance, PRIOR_CONTEXT_HEADING};
    use crate::errors::Result;
    use crate::formatter::{SOURCES_HEADING, STATUS_HEADING};
    use crate::providers::{GatewaySettings, LlmProvider, ProviderRegistration};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    const QUESTION: &str = "What are current property market trends?";

    /// Provider that answers probes and then replies with a fixed text or error
    struct FakeProvider {
        id: ProviderId,
        reply: Option<&'static str>,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn new(id: ProviderId, reply: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                id,
                reply,
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn last_prompt(&self) -> Option<String> {
            self.prompts.lock().unwrap().last().cloned()
        }
    }

    #[async_trait]
    impl LlmProvider for FakeProvider {
        fn id(&self) -> ProviderId {
            self.id
        }

        async fn generate(&self, _model: &str, prompt: &str, max_tokens: u32) -> Result<String> {
            if max_tokens <= 5 {
                return Ok("ok".into());
            }
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.map(str::to_string).ok_or_else(|| AppError::ProviderCallFailed {
                provider: self.id.display_name().into(),
                message: "quota exceeded".into(),
            })
        }
    }

    struct FakeNews {
        sources: Vec<ContextSource>,
        fail: bool,
        calls: Mutex<Vec<(bool, usize)>>,
    }

    impl FakeNews {
        fn with(sources: Vec<ContextSource>) -> Arc<Self> {
            Arc::new(Self {
                sources,
                fail: false,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                sources: Vec::new(),
                fail: true,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl NewsSource for FakeNews {
        async fn fetch(&self, _query: &str, region_focus: bool, max_items: usize) -> Result<Vec<ContextSource>> {
            self.calls.lock().unwrap().push((region_focus, max_items));
            if self.fail {
                return Err(AppError::ContextUnavailable {
                    message: "feeds down".into(),
                });
            }
            Ok(self.sources.clone())
        }
    }

    fn sources(n: usize) -> Vec<ContextSource> {
        (0..n)
            .map(|i| {
                ContextSource::genuine(
                    "RealEstate.com.au News",
                    format!("Story {}", i),
                    "summary",
                    format!("https://example.com/{}", i),
                    "Mon, 03 Jun 2024",
                    Some(i as i64),
                    Relevance::Medium,
                    300,
                )
            })
            .collect()
    }

    fn settings() -> AnalyzerSettings {
        AnalyzerSettings::from_config(&AppConfig::default())
    }

    async fn analyzer(
        claude: Option<Arc<FakeProvider>>,
        gemini: Option<Arc<FakeProvider>>,
        news: Option<Arc<dyn NewsSource>>,
    ) -> PropertyAnalyzer {
        let registration = |id: ProviderId, fake: Option<Arc<FakeProvider>>| match fake {
            Some(fake) => ProviderRegistration::ready(fake, vec!["model-a".into()]),
            None => ProviderRegistration::absent(id, true, false),
        };
        let gateway = ProviderGateway::initialize(
            GatewaySettings {
                timeout: Duration::from_secs(1),
                max_attempts: 1,
                retry_base_delay: Duration::from_millis(1),
            },
            vec![
                registration(ProviderId::Claude, claude),
                registration(ProviderId::Gemini, gemini),
            ],
        )
        .await;
        PropertyAnalyzer::new(Arc::new(gateway), news, settings())
    }

    /// Formatting stage that always faults
    struct BrokenFormatter;

    impl Compose for BrokenFormatter {
        fn compose(
            &self,
            _question: &str,
            _strategic: &ProviderResult,
            _comprehensive: &ProviderResult,
            _sources: &[ContextSource],
            _generated_at: chrono::DateTime<Utc>,
        ) -> Result<String> {
            Err(std::fmt::Error.into())
        }
    }

    #[test]
    fn test_classify() {
        let presets = settings().preset_questions;
        for preset in &presets {
            assert_eq!(classify(preset, &presets), QuestionType::Preset);
        }
        assert_eq!(classify("", &presets), QuestionType::Custom);
        assert_eq!(classify(&format!("{} ", presets[0]), &presets), QuestionType::Custom);
    }

    #[tokio::test]
    async fn test_both_providers_succeed() {
        let claude = FakeProvider::new(ProviderId::Claude, Some("STRATEGIC INSIGHT"));
        let gemini = FakeProvider::new(ProviderId::Gemini, Some("FULL REPORT"));
        let analyzer = analyzer(Some(claude.clone()), Some(gemini.clone()), None).await;

        let result = analyzer.analyze(QUESTION).await;
        assert!(result.success);
        assert!(result.processing_stages.claude_success);
        assert!(result.processing_stages.gemini_success);
        assert!(result.final_answer.starts_with("FULL REPORT"));
        assert_eq!(result.processing_stages.claude_model.as_deref(), Some("model-a"));

        // Chained prompt carries the strategic output
        let chained = gemini.last_prompt().unwrap();
        assert!(chained.contains("STRATEGIC INSIGHT"));
        assert!(claude.last_prompt().unwrap().contains(QUESTION));
    }

    #[tokio::test]
    async fn test_strategic_failure_not_chained() {
        let claude = FakeProvider::new(ProviderId::Claude, None);
        let gemini = FakeProvider::new(ProviderId::Gemini, Some("FULL REPORT"));
        let analyzer = analyzer(Some(claude), Some(gemini.clone()), None).await;

        let result = analyzer.analyze(QUESTION).await;
        assert!(result.success);
        assert!(!result.processing_stages.claude_success);
        assert!(result.final_answer.starts_with("FULL REPORT"));
        assert!(result.final_answer.contains("❌ Strategic Analysis Failed"));

        let chained = gemini.last_prompt().unwrap();
        assert!(!chained.contains(PRIOR_CONTEXT_HEADING));
        assert!(!chained.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_both_unavailable_returns_fallback() {
        let analyzer = analyzer(None, None, None).await;

        let result = analyzer.analyze(QUESTION).await;
        assert!(result.success);
        assert_eq!(result.final_answer, fallback::generate(QUESTION));
        assert!(result.used_fallback());
        assert!(result.error.is_none());
        assert!(result.claude_result.error.as_deref().unwrap().contains("not configured"));

        let again = analyzer.analyze(QUESTION).await;
        assert_eq!(again.final_answer, result.final_answer);
    }

    #[tokio::test]
    async fn test_both_fail_after_calls_returns_fallback() {
        let analyzer = analyzer(
            Some(FakeProvider::new(ProviderId::Claude, None)),
            Some(FakeProvider::new(ProviderId::Gemini, None)),
            Some(FakeNews::with(Vec::new())),
        )
        .await;

        let result = analyzer.analyze(QUESTION).await;
        assert!(result.success);
        assert_eq!(result.final_answer, fallback::generate(QUESTION));
        assert_eq!(result.processing_stages.data_sources_count, 0);
    }

    #[tokio::test]
    async fn test_empty_question_does_not_fail() {
        let analyzer = analyzer(None, None, None).await;
        let result = analyzer.analyze("").await;
        assert_eq!(result.question_type, QuestionType::Custom);
        assert!(!result.final_answer.is_empty());
    }

    #[tokio::test]
    async fn test_sources_rendered_and_capped() {
        let news = FakeNews::with(sources(9));
        let analyzer = analyzer(
            Some(FakeProvider::new(ProviderId::Claude, Some("A"))),
            Some(FakeProvider::new(ProviderId::Gemini, Some("B"))),
            Some(news.clone()),
        )
        .await;

        let result = analyzer.analyze(QUESTION).await;
        assert!(result.processing_stages.real_data_used);
        // Collaborator results are capped at the general item budget
        assert_eq!(result.processing_stages.data_sources_count, 8);
        assert_eq!(result.final_answer.matches("- **RealEstate.com.au News**").count(), 5);
        assert_eq!(news.calls.lock().unwrap()[0], (false, 8));
    }

    #[tokio::test]
    async fn test_no_sources_omits_section() {
        let analyzer = analyzer(
            Some(FakeProvider::new(ProviderId::Claude, Some("A"))),
            Some(FakeProvider::new(ProviderId::Gemini, Some("B"))),
            Some(FakeNews::with(Vec::new())),
        )
        .await;

        let result = analyzer.analyze(QUESTION).await;
        assert!(!result.final_answer.contains(SOURCES_HEADING));
        assert!(result.final_answer.contains(STATUS_HEADING));
        assert!(!result.processing_stages.real_data_used);
    }

    #[tokio::test]
    async fn test_region_focus_and_failing_news() {
        let news = FakeNews::failing();
        let analyzer = analyzer(
            Some(FakeProvider::new(ProviderId::Claude, Some("A"))),
            None,
            Some(news.clone()),
        )
        .await;

        let result = analyzer.analyze("Which Gold Coast suburbs are growing?").await;
        assert!(result.success);
        assert!(result.data_sources.is_empty());
        assert!(result.final_answer.starts_with('A'));
        assert_eq!(news.calls.lock().unwrap()[0], (true, 6));
    }

    #[tokio::test]
    async fn test_summary() {
        let analyzer = analyzer(
            Some(FakeProvider::new(ProviderId::Claude, Some("A"))),
            Some(FakeProvider::new(ProviderId::Gemini, None)),
            None,
        )
        .await;

        let result = analyzer.analyze(QUESTION).await;
        let summary = result.summary();
        assert_eq!(summary.providers_used, vec![ProviderId::Claude]);
        assert_eq!(summary.answer_length, result.final_answer.chars().count());
        assert!(!summary.real_data_used);
    }

    #[tokio::test]
    async fn test_formatting_fault_returns_fallback() {
        let claude = FakeProvider::new(ProviderId::Claude, Some("STRATEGIC INSIGHT"));
        let gemini = FakeProvider::new(ProviderId::Gemini, Some("FULL REPORT"));
        let analyzer = analyzer(Some(claude), Some(gemini), None)
            .await
            .with_formatter(Arc::new(BrokenFormatter));

        let result = analyzer.analyze(QUESTION).await;
        assert!(!result.success);
        assert_eq!(result.final_answer, fallback::generate(QUESTION));
        assert!(result.error.as_deref().unwrap().contains("Failed to format answer"));
        // Provider outcomes are still reported
        assert!(result.processing_stages.claude_success);
        assert!(result.processing_stages.gemini_success);
    }
}
