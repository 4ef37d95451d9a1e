//! Static answers for when no provider produced text
//!
//! `generate` is a pure function of the question: a general market overview,
//! at most one category paragraph picked by keyword, and a closing note.

const OVERVIEW: &str = "Based on general Australian property market knowledge, here's an analysis of your question:

**Current Australian Property Market Overview:**
The Australian property market shows varied performance across major cities, with strong fundamentals in key metropolitan areas and emerging growth in regional centers.

**Key National Trends:**
- Sydney and Melbourne: Established premium markets with selective growth
- Brisbane and Perth: Strong growth potential with infrastructure investment
- Adelaide and Regional Areas: Emerging opportunities with affordability focus

**Market Factors to Consider:**
- Interest rate environment and lending conditions
- Population growth and migration patterns
- Infrastructure development and transport connectivity
- Government policy and regulatory changes";

const DEVELOPMENT: &str = "**Development Activity Insights:**
Australian cities show strong development pipeline activity with focus on:
- Mixed-use developments in transit-oriented locations
- Medium-density housing in established suburbs
- Commercial developments in CBD and growth corridors";

const MARKET_TRENDS: &str = "**Market Trend Analysis:**
Current national trends indicate:
- Continued urbanization driving inner-city demand
- Regional growth supported by lifestyle migration
- Technology and infrastructure driving value appreciation";

const INFRASTRUCTURE: &str = "**Infrastructure Impact:**
Major infrastructure projects across Australia:
- Transport connectivity improving accessibility
- Urban renewal projects creating new precincts
- Technology infrastructure supporting modern development";

const CLOSING_NOTE: &str = "**Note**: Live market data and AI analysis were unavailable for this request, so this answer is based on general market knowledge. When available, the system analyses real-time RSS feeds from RealEstate.com.au, Smart Property Investment, and other industry sources.";

/// Categories checked in order; the first match wins
const CATEGORIES: &[(&[&str], &str)] = &[
    (&["development", "application", "planning"], DEVELOPMENT),
    (&["trend", "market", "growth"], MARKET_TRENDS),
    (&["infrastructure", "transport"], INFRASTRUCTURE),
];

/// Build the fallback answer for a question
pub fn generate(question: &str) -> String {
    let lower = question.to_lowercase();

    let mut parts = vec![OVERVIEW];
    if let Some((_, paragraph)) = CATEGORIES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
    {
        parts.push(paragraph);
    }
    parts.push(CLOSING_NOTE);

    parts.join("\n\n")
}
