//! Data structures for research runs.
//!
//! Everything in this module is plain data: requests, parsed intent,
//! hypotheses, evidence, findings, reports, and run telemetry. Pipeline
//! logic lives in `core`.

pub mod evidence;
pub mod metrics;
pub mod question;
pub mod report;

pub use evidence::{
    EvidenceSource, HypothesisOutcome, SourceTrust, TrustTier, TrustedDomain, ValidatedFinding,
    ValidatedSet, ValidationResult,
};
pub use metrics::{LlmCallRecord, RunLog, RunMetrics, RunSummary};
pub use question::{
    Category, Direction, Hypothesis, HypothesisSet, ParsedIntent, ResearchRequest,
    DEFAULT_HYPOTHESES_PER_CATEGORY, MAX_HYPOTHESES_PER_CATEGORY, MIN_HYPOTHESES_PER_CATEGORY,
};
pub use report::{
    Coaching, DriverEntry, DroppedFinding, PipelineEvent, QualityFilterNotice, ResearchReport,
    Summary,
};
