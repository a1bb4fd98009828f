//! Hypothesis generation.
//!
//! Three independent category generations (market, brand, competitive),
//! each backed by a deterministic static fallback so the pipeline never
//! stalls for lack of content, followed by a non-emptying relevance
//! filter. Probabilistic text generation is assumed to fail often: every
//! LLM output here routes through `extract_json` and every failure has a
//! defined local fallback. The one exception is quota exhaustion, which
//! propagates so the caller can surface an actionable error.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::{
    Category, Direction, Hypothesis, HypothesisSet, ParsedIntent, RunMetrics,
};
use crate::llm::json::extract_json;
use crate::llm::{LlmError, LlmGateway, Provider};
use crate::search::query::broaden_query;

/// Static competitor lookup, consulted before LLM discovery
const COMPETITOR_TABLE: &[(&str, &[&str])] = &[
    (
        "new look",
        &["primark", "m&s", "asos", "next", "h&m", "shein", "zara"],
    ),
    ("primark", &["new look", "h&m", "shein"]),
    ("zara", &["h&m", "shein", "asos"]),
];

/// Generic fallback competitors when nothing else is known
const FALLBACK_COMPETITORS: &[&str] = &["Zara", "H&M", "Primark"];

/// Options applied to one generation run
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    pub provider: Provider,

    /// Hypotheses per category, already clamped to [1, 10]
    pub cap: usize,

    /// Caller-supplied system prompt for generation calls
    pub system_prompt: Option<String>,
}

/// Generates candidate explanations for a metric change
#[derive(Clone)]
pub struct HypothesisGenerator {
    gateway: Arc<LlmGateway>,
}

impl HypothesisGenerator {
    pub fn new(gateway: Arc<LlmGateway>) -> Self {
        Self { gateway }
    }

    /// Resolve the brand's industry with one short constrained call.
    ///
    /// Used only to contextualize later prompts; never blocks generation
    /// on failure.
    pub async fn resolve_industry(
        &self,
        brand: &str,
        provider: Provider,
        metrics: &RunMetrics,
    ) -> Option<String> {
        let prompt = format!(
            "What industry does the brand \"{brand}\" operate in? \
             Answer with a short industry label only (e.g. \"fashion retail\")."
        );

        match self.gateway.generate(&prompt, provider, 60, None, metrics).await {
            Ok(text) => {
                let label = text.lines().next().unwrap_or("").trim().trim_matches('"');
                if label.is_empty() || label.len() > 80 {
                    None
                } else {
                    Some(label.to_lowercase())
                }
            }
            Err(e) => {
                debug!(error = %e, "industry resolution failed");
                None
            }
        }
    }

    /// Known competitors from the static table
    pub fn known_competitors(brand: &str) -> Vec<String> {
        COMPETITOR_TABLE
            .iter()
            .find(|(b, _)| *b == brand)
            .map(|(_, comps)| comps.iter().map(|c| c.to_string()).collect())
            .unwrap_or_default()
    }

    /// Auto-discover competitors via LLM when the static table has none
    pub async fn discover_competitors(
        &self,
        intent: &ParsedIntent,
        provider: Provider,
        metrics: &RunMetrics,
    ) -> Vec<String> {
        let industry = intent.industry.as_deref().unwrap_or("its industry");
        let prompt = format!(
            "List the main competitors of the brand \"{}\" ({industry}).\n\
             Return ONLY a JSON object like: {{\"competitors\": [\"name\", \"name\"]}}",
            intent.brand
        );

        let content = match self.gateway.generate(&prompt, provider, 300, None, metrics).await {
            Ok(content) => content,
            Err(e) => {
                debug!(error = %e, "competitor discovery failed");
                return Vec::new();
            }
        };

        extract_json(&content)
            .get("competitors")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .take(8)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Generate hypotheses for all three categories.
    ///
    /// Each category gets one LLM call; a parse failure or empty result
    /// substitutes that category's static fallback set.
    pub async fn generate(
        &self,
        intent: &ParsedIntent,
        competitors: &[String],
        options: &GeneratorOptions,
        metrics: &RunMetrics,
    ) -> Result<HypothesisSet, LlmError> {
        let mut set = HypothesisSet::default();

        for category in Category::ALL {
            let prompt = category_prompt(category, intent, competitors, options.cap);
            let hypotheses = match self
                .gateway
                .generate(
                    &prompt,
                    options.provider,
                    1000,
                    options.system_prompt.as_deref(),
                    metrics,
                )
                .await
            {
                Ok(content) => parse_hypotheses(&content, category, options.cap),
                Err(e @ LlmError::QuotaExhausted { .. }) => return Err(e),
                Err(e) => {
                    warn!(category = category.key(), error = %e, "hypothesis generation failed");
                    Vec::new()
                }
            };

            *set.get_mut(category) = if hypotheses.is_empty() {
                debug!(category = category.key(), "using static fallback hypotheses");
                fallback_hypotheses(category, intent, competitors, options.cap)
            } else {
                hypotheses
            };
        }

        Ok(set)
    }

    /// Remove hypotheses the model flags as clearly irrelevant to the
    /// brand's industry.
    ///
    /// Safety net, not authoritative: a category is never emptied (its
    /// first original hypothesis survives), and any filter failure leaves
    /// the set unchanged.
    pub async fn filter_relevant(
        &self,
        set: &mut HypothesisSet,
        intent: &ParsedIntent,
        provider: Provider,
        metrics: &RunMetrics,
    ) {
        if set.total() == 0 {
            return;
        }

        let industry = intent.industry.as_deref().unwrap_or("unknown");
        let mut listing = String::new();
        for cat in Category::ALL {
            for hyp in set.get(cat) {
                listing.push_str(&format!("{}: {}\n", hyp.id, hyp.hypothesis));
            }
        }

        let prompt = format!(
            "These hypotheses explain a change in brand {metric} for \"{brand}\" \
             (industry: {industry}).\n\n{listing}\n\
             Flag hypothesis ids that are clearly irrelevant to that brand and industry.\n\
             Return ONLY a JSON object like: {{\"irrelevant\": [\"B2\"]}}",
            metric = intent.metric,
            brand = intent.brand,
        );

        let content = match self.gateway.generate(&prompt, provider, 300, None, metrics).await {
            Ok(content) => content,
            Err(e) => {
                debug!(error = %e, "relevance filter failed, keeping all hypotheses");
                return;
            }
        };

        let flagged: Vec<String> = extract_json(&content)
            .get("irrelevant")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if flagged.is_empty() {
            return;
        }

        for cat in Category::ALL {
            let list = set.get_mut(cat);
            let original_first = list.first().cloned();
            list.retain(|h| !flagged.contains(&h.id));

            // Never let the filter empty a category
            if list.is_empty() {
                if let Some(first) = original_first {
                    warn!(
                        category = cat.key(),
                        "relevance filter flagged whole category, keeping first hypothesis"
                    );
                    list.push(first);
                }
            }
        }
    }
}

/// Extract the parsed intent from the question with one LLM call.
///
/// Never fails short of quota exhaustion: any other error or parse
/// failure yields [`ParsedIntent::fallback`].
pub async fn parse_intent(
    gateway: &LlmGateway,
    question: &str,
    provider: Provider,
    metrics: &RunMetrics,
) -> Result<ParsedIntent, LlmError> {
    let prompt = format!(
        "Parse this brand research question and extract:\n\
         - brand: the brand being discussed (lowercase)\n\
         - metric: the metric mentioned (e.g. \"salience\", \"awareness\", \"consideration\")\n\
         - direction: \"increase\", \"decrease\", or \"change\"\n\
         - time_period: any time period mentioned (e.g. \"Q3 2025\"), or null\n\
         - region: any region or market mentioned, or null\n\n\
         Question: {question}\n\n\
         Return ONLY valid JSON with these exact keys."
    );

    let content = match gateway.generate(&prompt, provider, 500, None, metrics).await {
        Ok(content) => content,
        Err(e @ LlmError::QuotaExhausted { .. }) => return Err(e),
        Err(e) => {
            warn!(error = %e, "intent extraction failed, using fallback");
            return Ok(ParsedIntent::fallback());
        }
    };

    let map = extract_json(&content);
    if map.is_empty() {
        return Ok(ParsedIntent::fallback());
    }

    let str_field = |key: &str| -> Option<String> {
        map.get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };

    Ok(ParsedIntent {
        brand: str_field("brand")
            .map(|b| b.to_lowercase())
            .unwrap_or_else(|| "unknown".to_string()),
        metric: str_field("metric").unwrap_or_else(|| "salient".to_string()),
        direction: str_field("direction")
            .map(|d| Direction::parse(&d))
            .unwrap_or_default(),
        time_period: str_field("time_period"),
        region: str_field("region"),
        industry: None,
    })
}

fn category_prompt(
    category: Category,
    intent: &ParsedIntent,
    competitors: &[String],
    n: usize,
) -> String {
    let brand = &intent.brand;
    let direction = intent.direction.as_str();
    let period = intent.period_or_default();
    let industry = intent.industry.as_deref().unwrap_or("retail");
    let prefix = category.id_prefix();

    let focus = match category {
        Category::Market => format!(
            "{industry} MARKET trends (economy, consumer spending, channel shifts, seasonality) \
             that could cause {direction} in brand {metric} for {brand}",
            metric = intent.metric,
        ),
        Category::Brand => format!(
            "{brand}'s own actions or issues that could cause brand {metric} to {direction}. \
             Areas: advertising spend, store activity, marketing campaigns, PR, news coverage",
            metric = intent.metric,
        ),
        Category::Competitive => {
            let list = if competitors.is_empty() {
                "main competitors".to_string()
            } else {
                competitors
                    .iter()
                    .take(6)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            format!(
                "competitor actions affecting {brand}'s {metric}. Competitors to consider: {list}",
                metric = intent.metric,
            )
        }
    };

    format!(
        "Generate {n} hypotheses about {focus}.\n\
         Time period: {period}\n\n\
         Each hypothesis needs a targeted search_query and a broader broad_query.\n\
         Both queries MUST include the brand name \"{brand}\" and the time period \"{period}\".\n\n\
         Return ONLY a JSON object like:\n\
         {{\"hypotheses\": [{{\"id\": \"{prefix}1\", \"hypothesis\": \"description\", \
         \"search_query\": \"...\", \"broad_query\": \"...\"}}]}}"
    )
}

/// Parse a generation response permissively into at most `n` hypotheses
fn parse_hypotheses(content: &str, category: Category, n: usize) -> Vec<Hypothesis> {
    let map = extract_json(content);
    let items = match map.get("hypotheses").and_then(|v| v.as_array()) {
        Some(items) => items,
        None => return Vec::new(),
    };

    let prefix = category.id_prefix();
    let mut out = Vec::new();

    for item in items {
        let statement = match item.get("hypothesis").and_then(|v| v.as_str()) {
            Some(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => continue,
        };

        let id = item
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{prefix}{}", out.len() + 1));

        let search_query = item
            .get("search_query")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .filter(|q| !q.is_empty())
            .unwrap_or_else(|| statement.clone());

        let broad_query = item
            .get("broad_query")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .filter(|q| !q.is_empty());

        out.push(Hypothesis {
            id,
            hypothesis: statement,
            search_query,
            broad_query,
        });

        if out.len() == n {
            break;
        }
    }

    out
}

/// Deterministic fallback hypotheses for one category
fn fallback_hypotheses(
    category: Category,
    intent: &ParsedIntent,
    competitors: &[String],
    n: usize,
) -> Vec<Hypothesis> {
    let brand = &intent.brand;
    let period = intent.period_or_default();
    let region = intent.region.as_deref().unwrap_or("UK");
    let industry = intent.industry.as_deref().unwrap_or("fashion");

    let make = |id: &str, hypothesis: String, search_query: String| {
        let broad = broaden_query(&search_query, brand, period, region);
        Hypothesis {
            id: id.to_string(),
            hypothesis,
            search_query,
            broad_query: Some(broad),
        }
    };

    let mut out = match category {
        Category::Market => vec![
            make(
                "M1",
                format!("Economic downturn affecting {industry} spending in {period}"),
                format!("{region} {industry} spending economy {period}"),
            ),
            make(
                "M2",
                "Online shopping shift away from physical retail".to_string(),
                format!("{region} online {industry} shopping growth {period}"),
            ),
            make(
                "M3",
                format!("Seasonal trends or weather impacting {industry} sales"),
                format!("{region} {industry} sales weather seasonal {period}"),
            ),
        ],
        Category::Brand => vec![
            make(
                "B1",
                format!("{brand} store closures or reduced presence"),
                format!("{brand} store closures {period}"),
            ),
            make(
                "B2",
                format!("{brand} marketing or advertising spend changes"),
                format!("{brand} advertising marketing {period}"),
            ),
            make(
                "B3",
                format!("News or media coverage about {brand}"),
                format!("{brand} news media {period}"),
            ),
        ],
        Category::Competitive => {
            let comps: Vec<String> = if competitors.is_empty() {
                FALLBACK_COMPETITORS.iter().map(|c| c.to_string()).collect()
            } else {
                competitors.to_vec()
            };
            let first = comps[0].clone();
            let second = comps.get(1).cloned().unwrap_or_else(|| first.clone());

            vec![
                make(
                    "C1",
                    format!("{first} launched a major marketing campaign"),
                    format!("{first} marketing campaign {region} {period}"),
                ),
                make(
                    "C2",
                    format!("{second} store expansion or new initiatives"),
                    format!("{second} stores {region} {period}"),
                ),
                make(
                    "C3",
                    "Competitor news or media dominance".to_string(),
                    format!("{region} {industry} retailers competition {period}"),
                ),
            ]
        }
    };

    out.truncate(n);
    out
}
