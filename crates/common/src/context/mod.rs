//! Context builder
//!
//! Turns contextual records into the text blocks submitted to the providers:
//! - `build`: the data block shared by both passes
//! - `strategic_prompt`: the first (Claude) prompt
//! - `chain`: the second (Gemini) prompt, carrying the first pass's output
//!
//! All operations are pure text transforms.

mod source;

pub use source::{sort_newest_first, truncate_summary, ContextSource, Relevance, ELLIPSIS};

use chrono::{DateTime, Utc};

/// Notice used when no live data backs the request
pub const NO_DATA_NOTICE: &str = "# Australian Property Market Analysis Context\n\
Note: Real-time market data is temporarily unavailable. \
The analysis that follows is based on general property market knowledge.\n";

const DATA_INSTRUCTIONS: &str = "**Analysis Instructions**: This is REAL current Australian property \
market data from live industry RSS feeds. Treat it as authentic current information and ground \
your analysis in these actual market conditions and developments.";

/// Heading under which the first pass's output is chained
pub const PRIOR_CONTEXT_HEADING: &str = "## Strategic Analysis Context (from Claude):";

#[derive(Debug, Clone)]
pub struct ContextBuilder {
    sources_cap: usize,
}

impl ContextBuilder {
    pub fn new(sources_cap: usize) -> Self {
        Self { sources_cap }
    }

    /// Render the data block for a request.
    ///
    /// Only genuine records are rendered, newest first and at most
    /// `sources_cap` of them. Without any, the neutral notice is returned.
    pub fn build(&self, sources: &[ContextSource], generated_at: DateTime<Utc>) -> String {
        let mut genuine: Vec<&ContextSource> = sources.iter().filter(|s| s.real_data).collect();
        if genuine.is_empty() {
            return NO_DATA_NOTICE.to_string();
        }
        sort_newest_first(&mut genuine);

        let mut out = String::with_capacity(256 + genuine.len() * 512);
        out.push_str("# Current Australian Property Market Data\n");
        out.push_str(&format!(
            "Retrieved from live industry RSS feeds on {}\n\n",
            generated_at.format("%Y-%m-%d %H:%M")
        ));
        out.push_str("## Real Property News and Developments:\n");

        for (i, source) in genuine.iter().take(self.sources_cap).enumerate() {
            out.push_str(&format!("\n### {}. {}\n", i + 1, source.title));
            out.push_str(&format!("- **Source**: {}\n", source.source));
            out.push_str(&format!("- **Published**: {}\n", source.published));
            out.push_str(&format!("- **Summary**: {}\n", source.summary));
            out.push_str(&format!("- **Link**: {}\n", source.link));
            if source.is_high_relevance() {
                out.push_str(&format!(
                    "- **Relevance**: {} High relevance to query\n",
                    Relevance::High.marker()
                ));
            }
        }

        out.push('\n');
        out.push_str(DATA_INSTRUCTIONS);
        out.push('\n');
        out
    }

    /// Prompt for the strategic (first) pass
    pub fn strategic_prompt(&self, question: &str, context: &str) -> String {
        format!(
            "{context}\n\
You are a Brisbane property research specialist. Analyze this question and provide insights:\n\n\
Question: \"{question}\"\n\n\
Please provide:\n\
1. What type of property question this is (development, market, infrastructure, zoning, etc.)\n\
2. Which specific Brisbane suburbs/areas are most relevant\n\
3. What data sources would help answer this question\n\
4. Key insights to look for in the data\n\n\
Keep your response concise and focused specifically on Brisbane, Queensland, Australia."
        )
    }

    /// Prompt for the comprehensive (second) pass.
    ///
    /// When the first pass produced text it is included verbatim beneath the
    /// data block. A failed first pass contributes nothing.
    pub fn chain(&self, question: &str, context: &str, prior: Option<&str>) -> String {
        let mut out = String::from(context);

        if let Some(prior) = prior.filter(|p| !p.trim().is_empty()) {
            out.push_str("\n\n");
            out.push_str(PRIOR_CONTEXT_HEADING);
            out.push('\n');
            out.push_str(prior);
            out.push_str(
                "\n\n## Final Analysis Instructions:\n\
Using the market data above and the strategic analysis, build upon that analysis rather than \
restating it. Provide a comprehensive, professional response that:\n\
1. Directly answers the user's question\n\
2. References specific information from the data sources\n\
3. Provides actionable insights based on current market conditions\n\
4. Uses a professional but accessible tone\n",
            );
        }

        out.push_str(&format!(
            "\nYou are a Brisbane property market analyst. Provide a comprehensive answer to this question:\n\n\
Question: \"{question}\"\n\n\
Please provide a detailed Brisbane property market analysis that directly answers the question. Include:\n\
- Specific Brisbane suburbs and areas\n\
- Current market trends and data\n\
- Investment or development implications\n\
- Professional insights for property industry\n\n\
Focus on actionable information for Brisbane property professionals."
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(title: &str, at: i64, relevance: Relevance) -> ContextSource {
        ContextSource::genuine(
            "RealEstate.com.au News",
            title,
            "Summary text",
            format!("https://example.com/{}", at),
            format!("day {}", at),
            Some(at),
            relevance,
            300,
        )
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_build_without_sources() {
        let builder = ContextBuilder::new(6);
        assert_eq!(builder.build(&[], now()), NO_DATA_NOTICE);

        let mut synthetic = item("placeholder", 1, Relevance::Medium);
        synthetic.real_data = false;
        assert_eq!(builder.build(&[synthetic], now()), NO_DATA_NOTICE);
    }

    #[test]
    fn test_build_orders_and_caps() {
        let builder = ContextBuilder::new(2);
        let sources = vec![
            item("Oldest", 100, Relevance::Medium),
            item("Newest", 300, Relevance::High),
            item("Middle", 200, Relevance::Medium),
        ];
        let text = builder.build(&sources, now());

        assert!(text.contains("on 2024-06-03 09:30"));
        let newest = text.find("### 1. Newest").unwrap();
        let middle = text.find("### 2. Middle").unwrap();
        assert!(newest < middle);
        assert!(!text.contains("Oldest"));
        assert_eq!(text.matches("🔥").count(), 1);
        assert!(text.trim_end().ends_with(DATA_INSTRUCTIONS));
    }

    #[test]
    fn test_build_puts_undated_sources_last() {
        let builder = ContextBuilder::new(6);
        let mut undated = item("Undated", 0, Relevance::Medium);
        undated.published_at = None;
        let sources = vec![undated, item("Dated", 100, Relevance::Medium)];
        let text = builder.build(&sources, now());

        assert!(text.contains("### 1. Dated"));
        assert!(text.contains("### 2. Undated"));
    }

    #[test]
    fn test_chain_includes_prior_output() {
        let builder = ContextBuilder::new(6);
        let prior = "Focus on Chermside and Carseldine growth corridors.";
        let prompt = builder.chain("Where to invest?", NO_DATA_NOTICE, Some(prior));

        assert!(prompt.starts_with(NO_DATA_NOTICE));
        assert!(prompt.contains(PRIOR_CONTEXT_HEADING));
        assert!(prompt.contains(prior));
        assert!(prompt.contains("Question: \"Where to invest?\""));
    }

    #[test]
    fn test_chain_omits_missing_prior() {
        let builder = ContextBuilder::new(6);
        for prior in [None, Some(""), Some("   ")] {
            let prompt = builder.chain("Where to invest?", NO_DATA_NOTICE, prior);
            assert!(!prompt.contains(PRIOR_CONTEXT_HEADING));
            assert!(!prompt.contains("Final Analysis Instructions"));
        }
    }

    #[test]
    fn test_strategic_prompt_contains_question_and_context() {
        let builder = ContextBuilder::new(6);
        let prompt = builder.strategic_prompt("Is Logan affordable?", NO_DATA_NOTICE);
        assert!(prompt.starts_with(NO_DATA_NOTICE));
        assert!(prompt.contains("Question: \"Is Logan affordable?\""));
    }
}
