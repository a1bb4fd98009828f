//! Final report, summary, coaching, and streaming event types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::evidence::{HypothesisOutcome, ValidatedSet};
use super::question::{Category, Direction, HypothesisSet};

/// Non-pipeline guidance returned for help requests and out-of-scope
/// questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coaching {
    /// "help" or "coaching"
    pub kind: String,

    pub message: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supported_metrics: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggested_questions: Vec<String>,

    /// What the user needs to supply to make the question answerable
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub need: Vec<String>,
}

/// One driver entry in the summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverEntry {
    /// Evidence text, falling back to the hypothesis statement
    pub driver: String,
    pub hypothesis: String,
    pub source_urls: Vec<String>,
    pub source_title: String,
    pub confidence: String,
    pub status: String,
}

/// Validated findings reshaped into the external driver schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub macro_drivers: Vec<DriverEntry>,

    #[serde(default)]
    pub brand_drivers: Vec<DriverEntry>,

    #[serde(default)]
    pub competitive_drivers: Vec<DriverEntry>,
}

impl Summary {
    pub fn get(&self, category: Category) -> &Vec<DriverEntry> {
        match category {
            Category::Market => &self.macro_drivers,
            Category::Brand => &self.brand_drivers,
            Category::Competitive => &self.competitive_drivers,
        }
    }

    pub fn get_mut(&mut self, category: Category) -> &mut Vec<DriverEntry> {
        match category {
            Category::Market => &mut self.macro_drivers,
            Category::Brand => &mut self.brand_drivers,
            Category::Competitive => &mut self.competitive_drivers,
        }
    }

    pub fn total(&self) -> usize {
        self.macro_drivers.len() + self.brand_drivers.len() + self.competitive_drivers.len()
    }
}

/// A finding removed by the quality gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DroppedFinding {
    pub category: Category,
    pub hypothesis: String,
    pub trust_score: u32,
}

/// Notice emitted when the quality gate dropped findings to reach the
/// minimum verified-source ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityFilterNotice {
    pub threshold_pct: f64,
    pub ratio_before_pct: f64,
    pub ratio_after_pct: f64,
    pub dropped: Vec<DroppedFinding>,
}

/// The complete result of one research run. Structurally complete on
/// every path: all categories are present even when empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub question: String,
    pub brand: String,

    /// Metric names (array for the external schema)
    pub metrics: Vec<String>,

    pub direction: Direction,
    pub time_period: Option<String>,
    pub provider_used: String,

    pub hypotheses: HypothesisSet,
    pub validated_hypotheses: ValidatedSet,
    pub summary: Summary,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub coaching: Option<Coaching>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_filter: Option<QualityFilterNotice>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub executive_summary: Option<String>,

    /// Fraction (percent) of validated findings backed by a trusted source
    pub trusted_ratio_pct: f64,

    // Telemetry
    pub run_id: Uuid,
    pub latency_ms: u64,
    pub web_searches: u64,
    pub web_search_retries: u64,
    pub llm_calls: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub tokens_total: u64,
}

/// Lifecycle events emitted by the streaming entry point, in order:
/// started, parsed, competitors, hypotheses, one hypothesis_result per
/// completion (completion order), quality_filter (only if findings were
/// dropped), executive_summary (optional), final.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    Started {
        run_id: Uuid,
        provider: String,
    },
    Parsed {
        brand: String,
        metric: String,
        direction: Direction,
        time_period: Option<String>,
    },
    Competitors {
        competitors: Vec<String>,
    },
    Hypotheses {
        hypotheses: HypothesisSet,
    },
    HypothesisResult {
        #[serde(flatten)]
        outcome: HypothesisOutcome,
        completed: usize,
        total: usize,
    },
    QualityFilter {
        notice: QualityFilterNotice,
    },
    ExecutiveSummary {
        text: String,
    },
    Final {
        report: Box<ResearchReport>,
    },
}
