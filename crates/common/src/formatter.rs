//! Answer formatter
//!
//! Assembles the user-facing answer from ordered segments: the main body,
//! the sources list (only when genuine sources exist) and the status block.

use crate::context::ContextSource;
use crate::errors::Result;
use crate::fallback;
use crate::providers::ProviderResult;
use chrono::{DateTime, Utc};
use std::fmt::Write;

pub const SOURCES_HEADING: &str = "### Real Australian Property Data Sources";
pub const STATUS_HEADING: &str = "### AI Analysis Summary";

/// The formatting stage of the pipeline
pub trait Compose: Send + Sync {
    fn compose(
        &self,
        question: &str,
        strategic: &ProviderResult,
        comprehensive: &ProviderResult,
        sources: &[ContextSource],
        generated_at: DateTime<Utc>,
    ) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct AnswerFormatter {
    display_cap: usize,
}

impl AnswerFormatter {
    pub fn new(display_cap: usize) -> Self {
        Self { display_cap }
    }

    /// Compose the final answer.
    ///
    /// The body is the comprehensive pass if it succeeded, else the strategic
    /// pass, else the fallback text for `question`.
    pub fn compose(
        &self,
        question: &str,
        strategic: &ProviderResult,
        comprehensive: &ProviderResult,
        sources: &[ContextSource],
        generated_at: DateTime<Utc>,
    ) -> Result<String> {
        let body = match comprehensive.output().or(strategic.output()) {
            Some(text) => text.to_string(),
            None => fallback::generate(question),
        };

        let genuine: Vec<&ContextSource> = sources.iter().filter(|s| s.real_data).collect();

        let mut segments = vec![body];
        if let Some(list) = self.sources_segment(&genuine)? {
            segments.push(list);
        }
        segments.push(status_segment(strategic, comprehensive, genuine.len(), generated_at)?);

        Ok(segments.join("\n\n"))
    }

    fn sources_segment(&self, genuine: &[&ContextSource]) -> Result<Option<String>> {
        if genuine.is_empty() {
            return Ok(None);
        }

        let mut out = String::from(SOURCES_HEADING);
        out.push('\n');
        for source in genuine.iter().take(self.display_cap) {
            write!(
                out,
                "\n- **{}** {}: {}",
                source.source,
                source.relevance.marker(),
                source.title
            )?;
            if !source.published.is_empty() {
                write!(out, "\n  *Published: {}*", source.published)?;
            }
        }
        Ok(Some(out))
    }
}

fn status_segment(
    strategic: &ProviderResult,
    comprehensive: &ProviderResult,
    genuine_sources: usize,
    generated_at: DateTime<Utc>,
) -> Result<String> {
    let line = |result: &ProviderResult, label: &str| {
        let model = result
            .model_used
            .as_deref()
            .map(|m| format!(" ({})", m))
            .unwrap_or_default();
        if result.success {
            format!("✅ {} Completed{}", label, model)
        } else {
            format!("❌ {} Failed", label)
        }
    };

    let data = if genuine_sources > 0 {
        format!("✅ {} Real RSS Sources", genuine_sources)
    } else {
        "⚠️ General market knowledge (live data unavailable)".to_string()
    };

    let mut out = String::from(STATUS_HEADING);
    out.push('\n');
    writeln!(out, "\n- **Claude**: {}", line(strategic, "Strategic Analysis"))?;
    writeln!(out, "- **Gemini**: {}", line(comprehensive, "Comprehensive Analysis"))?;
    writeln!(out, "- **Data Sources**: {}", data)?;
    write!(
        out,
        "- **Analysis Date**: {}",
        generated_at.format("%B %d, %Y at %I:%M %p")
    )?;
    Ok(out)
}

impl Compose for AnswerFormatter {
    fn compose(
        &self,
        question: &str,
        strategic: &ProviderResult,
        comprehensive: &ProviderResult,
        sources: &[ContextSource],
        generated_at: DateTime<Utc>,
    ) -> Result<String> {
        AnswerFormatter::compose(self, question, strategic, comprehensive, sources, generated_at)
    }
}
