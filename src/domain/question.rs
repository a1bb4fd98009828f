//! Research requests, parsed intent, and hypotheses.
//!
//! A request is immutable once a run starts. Hypotheses are created by the
//! generator and consumed read-only by the validator.

use serde::{Deserialize, Serialize};

use super::evidence::TrustedDomain;

/// Bounds for the per-category hypothesis cap.
pub const MIN_HYPOTHESES_PER_CATEGORY: usize = 1;
pub const MAX_HYPOTHESES_PER_CATEGORY: usize = 10;
pub const DEFAULT_HYPOTHESES_PER_CATEGORY: usize = 4;

/// A question submitted to the research pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRequest {
    /// The natural-language question
    pub question: String,

    /// LLM provider name ("anthropic" or "openai"); falls back to the
    /// configured default when absent
    #[serde(default)]
    pub provider: Option<String>,

    /// Optional system prompt prepended to hypothesis-generation calls
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Max hypotheses per category, clamped to [1, 10] (default: 4)
    #[serde(default)]
    pub max_hypotheses_per_category: Option<usize>,

    /// Per-request trusted-source list; never mutates the shared registry
    #[serde(default)]
    pub trusted_sources: Option<Vec<TrustedDomain>>,

    /// Cheaper settings for eval runs (2 hypotheses per category, no
    /// escalation passes)
    #[serde(default)]
    pub eval_mode: bool,
}

impl ResearchRequest {
    /// Build a request with defaults for everything but the question
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            provider: None,
            system_prompt: None,
            max_hypotheses_per_category: None,
            trusted_sources: None,
            eval_mode: false,
        }
    }

    /// The effective per-category hypothesis cap, clamped to [1, 10]
    pub fn hypothesis_cap(&self) -> usize {
        self.max_hypotheses_per_category
            .unwrap_or(DEFAULT_HYPOTHESES_PER_CATEGORY)
            .clamp(MIN_HYPOTHESES_PER_CATEGORY, MAX_HYPOTHESES_PER_CATEGORY)
    }
}

/// Direction of the metric change under investigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
    Change,
}

impl Default for Direction {
    fn default() -> Self {
        Self::Change
    }
}

impl Direction {
    /// Lowercase label used in prompts
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increase => "increase",
            Self::Decrease => "decrease",
            Self::Change => "change",
        }
    }

    /// Permissive parse from LLM output; anything unrecognized is `Change`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "increase" | "increased" | "up" | "rose" | "gain" => Self::Increase,
            "decrease" | "decreased" | "down" | "fell" | "drop" => Self::Decrease,
            _ => Self::Change,
        }
    }
}

/// What the question is asking: brand, metric, direction, and optional
/// time period / region / industry context.
///
/// Produced once per run by an LLM extractor; extraction never fails (see
/// [`ParsedIntent::fallback`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedIntent {
    /// Brand under discussion, lowercased
    pub brand: String,

    /// Metric name (e.g. "salience")
    pub metric: String,

    /// Direction of the change
    pub direction: Direction,

    /// Time period as free text (e.g. "Q3 2025"), if mentioned
    #[serde(default)]
    pub time_period: Option<String>,

    /// Region, if mentioned
    #[serde(default)]
    pub region: Option<String>,

    /// Industry label resolved separately, used to contextualize prompts
    #[serde(default)]
    pub industry: Option<String>,
}

impl ParsedIntent {
    /// Fixed fallback used whenever extraction fails
    pub fn fallback() -> Self {
        Self {
            brand: "unknown".to_string(),
            metric: "salient".to_string(),
            direction: Direction::Change,
            time_period: None,
            region: None,
            industry: None,
        }
    }

    /// Time period for prompts/queries, defaulting to the current-ish year
    pub fn period_or_default(&self) -> &str {
        self.time_period.as_deref().unwrap_or("2025")
    }
}

/// Hypothesis categories. Exactly three; each run produces one set per
/// category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Market,
    Brand,
    Competitive,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Market, Category::Brand, Category::Competitive];

    /// Key used in request/response maps
    pub fn key(&self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Brand => "brand",
            Self::Competitive => "competitive",
        }
    }

    /// Hypothesis id prefix ("M1", "B2", "C3", ...)
    pub fn id_prefix(&self) -> char {
        match self {
            Self::Market => 'M',
            Self::Brand => 'B',
            Self::Competitive => 'C',
        }
    }

    /// Key of the corresponding driver list in the summary
    pub fn driver_key(&self) -> &'static str {
        match self {
            Self::Market => "macro_drivers",
            Self::Brand => "brand_drivers",
            Self::Competitive => "competitive_drivers",
        }
    }
}

/// A candidate explanation for the metric change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Category-scoped id (e.g. "M1")
    pub id: String,

    /// Natural-language statement
    pub hypothesis: String,

    /// Targeted search query for the first evidence pass
    pub search_query: String,

    /// Broader fallback query for the second pass, when the generator
    /// provided one
    #[serde(default)]
    pub broad_query: Option<String>,
}

/// Hypotheses grouped by category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HypothesisSet {
    #[serde(default)]
    pub market: Vec<Hypothesis>,

    #[serde(default)]
    pub brand: Vec<Hypothesis>,

    #[serde(default)]
    pub competitive: Vec<Hypothesis>,
}

impl HypothesisSet {
    pub fn get(&self, category: Category) -> &Vec<Hypothesis> {
        match category {
            Category::Market => &self.market,
            Category::Brand => &self.brand,
            Category::Competitive => &self.competitive,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut Vec<Hypothesis> {
        match category {
            Category::Market => &mut self.market,
            Category::Brand => &mut self.brand,
            Category::Competitive => &mut self.competitive,
        }
    }

    /// Total hypothesis count across categories
    pub fn total(&self) -> usize {
        self.market.len() + self.brand.len() + self.competitive.len()
    }

    /// Flatten into (category, hypothesis) pairs in category order
    pub fn tasks(&self) -> Vec<(Category, Hypothesis)> {
        let mut tasks = Vec::with_capacity(self.total());
        for cat in Category::ALL {
            for hyp in self.get(cat) {
                tasks.push((cat, hyp.clone()));
            }
        }
        tasks
    }

    /// Keep at most `n` hypotheses per category
    pub fn truncate_each(&mut self, n: usize) {
        self.market.truncate(n);
        self.brand.truncate(n);
        self.competitive.truncate(n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hypothesis_cap_clamped() {
        let mut req = ResearchRequest::new("q");
        assert_eq!(req.hypothesis_cap(), 4);

        req.max_hypotheses_per_category = Some(0);
        assert_eq!(req.hypothesis_cap(), 1);

        req.max_hypotheses_per_category = Some(25);
        assert_eq!(req.hypothesis_cap(), 10);
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!(Direction::parse("Decrease"), Direction::Decrease);
        assert_eq!(Direction::parse("fell"), Direction::Decrease);
        assert_eq!(Direction::parse("rose"), Direction::Increase);
        assert_eq!(Direction::parse("sideways"), Direction::Change);
    }

    #[test]
    fn test_tasks_flatten_in_category_order() {
        let set = HypothesisSet {
            market: vec![Hypothesis {
                id: "M1".into(),
                hypothesis: "m".into(),
                search_query: "q".into(),
                broad_query: None,
            }],
            brand: vec![],
            competitive: vec![Hypothesis {
                id: "C1".into(),
                hypothesis: "c".into(),
                search_query: "q".into(),
                broad_query: None,
            }],
        };

        let tasks = set.tasks();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].0, Category::Market);
        assert_eq!(tasks[1].0, Category::Competitive);
    }
}
