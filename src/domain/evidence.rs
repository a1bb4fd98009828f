//! Evidence sources, trust metadata, and validation outcomes.

use serde::{Deserialize, Serialize};

use super::question::Category;

/// Coarse credibility classification for a web domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    /// Curated high-trust outlet
    Trusted,
    /// Known industry/trade outlet
    Reputable,
    /// Not in the registry
    Unverified,
    /// Caller-supplied entry
    Custom,
}

/// A registry entry mapping a domain to a trust score and tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedDomain {
    /// Registrable domain, lowercase, no "www." (e.g. "reuters.com")
    pub domain: String,

    /// Display name (e.g. "Reuters")
    pub name: String,

    /// Higher = more trusted
    pub trust_score: u32,

    pub tier: TrustTier,
}

/// Trust verdict for a single URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTrust {
    pub trust_score: u32,
    pub tier: TrustTier,
    pub source_name: String,
    pub is_trusted: bool,
}

/// One retrieved piece of web evidence. Ephemeral: lives only for the run
/// that retrieved it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSource {
    pub title: String,
    pub url: String,

    /// Snippet or synthesized analysis text
    pub content: String,

    /// Unabridged content where available
    pub raw_content: String,

    pub trust_score: u32,
    pub tier: TrustTier,
    pub source_name: String,
    pub is_trusted: bool,

    /// True for the pseudo-source built from search-analysis prose; it gets
    /// a larger content window during judging
    #[serde(default)]
    pub synthesized: bool,
}

/// LLM judge verdict for one hypothesis against retrieved evidence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub validated: bool,

    /// Short factual summary (~20 words) when validated
    #[serde(default)]
    pub evidence: String,
}

impl ValidationResult {
    /// The "no clear answer" verdict: not validated, empty evidence
    pub fn not_validated() -> Self {
        Self::default()
    }
}

/// A hypothesis that survived validation, with its accepted evidence.
///
/// Exists only when the judge validated against at least one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedFinding {
    /// Always "VALIDATED"
    pub status: String,

    pub hypothesis: String,
    pub evidence: String,
    pub source: String,
    pub source_title: String,

    pub trust_score: u32,
    pub tier: TrustTier,
    pub is_trusted: bool,

    /// Whether the broad second search pass produced this result
    #[serde(default)]
    pub second_pass_used: bool,

    /// Whether the trusted-source steering pass swapped in this evidence
    #[serde(default)]
    pub trusted_steer_used: bool,
}

/// Validated findings grouped by category. The quality gate may only
/// remove entries from this set, never add or upgrade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidatedSet {
    #[serde(default)]
    pub market: Vec<ValidatedFinding>,

    #[serde(default)]
    pub brand: Vec<ValidatedFinding>,

    #[serde(default)]
    pub competitive: Vec<ValidatedFinding>,
}

impl ValidatedSet {
    pub fn get(&self, category: Category) -> &Vec<ValidatedFinding> {
        match category {
            Category::Market => &self.market,
            Category::Brand => &self.brand,
            Category::Competitive => &self.competitive,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut Vec<ValidatedFinding> {
        match category {
            Category::Market => &mut self.market,
            Category::Brand => &mut self.brand,
            Category::Competitive => &mut self.competitive,
        }
    }

    pub fn total(&self) -> usize {
        self.market.len() + self.brand.len() + self.competitive.len()
    }

    /// Count of findings whose accepted source is trusted
    pub fn trusted_count(&self) -> usize {
        Category::ALL
            .iter()
            .flat_map(|c| self.get(*c))
            .filter(|f| f.is_trusted)
            .count()
    }

    /// Per-category counts keyed by category name
    pub fn counts(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut counts = serde_json::Map::new();
        for cat in Category::ALL {
            counts.insert(cat.key().to_string(), self.get(cat).len().into());
        }
        counts
    }
}

/// The full per-hypothesis processing record emitted by the validator,
/// whether or not the hypothesis validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypothesisOutcome {
    pub category: Category,
    pub hypothesis: String,

    /// The specific query used in pass 1
    pub search_query: String,

    pub validated: bool,
    pub evidence: String,

    /// Leading accepted source, when any evidence was retrieved
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_title: Option<String>,
    #[serde(default)]
    pub source_trust: Option<SourceTrust>,

    /// Number of sources behind the accepted result
    pub result_count: usize,

    /// How many web searches this hypothesis consumed
    pub searches_used: u32,

    pub second_pass_used: bool,
    #[serde(default)]
    pub second_query: Option<String>,
    pub trusted_steer_used: bool,

    /// Set when processing this hypothesis failed; never aborts siblings
    #[serde(default)]
    pub error: Option<String>,
}

impl HypothesisOutcome {
    /// An error outcome for a hypothesis whose processing failed
    pub fn errored(category: Category, hypothesis: String, error: String) -> Self {
        Self {
            category,
            hypothesis,
            search_query: String::new(),
            validated: false,
            evidence: String::new(),
            source: None,
            source_title: None,
            source_trust: None,
            result_count: 0,
            searches_used: 0,
            second_pass_used: false,
            second_query: None,
            trusted_steer_used: false,
            error: Some(error),
        }
    }

    /// Convert to a finding; `None` unless validated with a source present
    pub fn into_finding(&self) -> Option<ValidatedFinding> {
        if !self.validated || self.error.is_some() {
            return None;
        }
        let source = self.source.clone()?;
        let trust = self.source_trust.clone()?;
        Some(ValidatedFinding {
            status: "VALIDATED".to_string(),
            hypothesis: self.hypothesis.clone(),
            evidence: self.evidence.clone(),
            source,
            source_title: self.source_title.clone().unwrap_or_default(),
            trust_score: trust.trust_score,
            tier: trust.tier,
            is_trusted: trust.is_trusted,
            second_pass_used: self.second_pass_used,
            trusted_steer_used: self.trusted_steer_used,
        })
    }
}
