//! researcher - Hypothesis-driven brand metric research pipeline
//!
//! Answers natural-language questions about why a brand performance metric
//! changed: candidate explanations are generated per category (market,
//! brand, competitive), validated against retrieved web evidence by an LLM
//! judge, filtered through a trusted-source quality gate, and reshaped
//! into a cited driver summary.
//!
//! # Architecture
//!
//! - Questions are routed cheaply first: help and out-of-scope questions
//!   short-circuit with guidance instead of burning search budget
//! - Every LLM output is parsed permissively with a defined fallback;
//!   probabilistic generation is assumed to fail often
//! - Hypotheses are validated concurrently under a bounded worker pool,
//!   with up to three strictly ordered search passes each
//!
//! # Modules
//!
//! - `domain`: Data structures (requests, hypotheses, evidence, reports)
//! - `core`: Pipeline logic (classifier, generator, validator, orchestrator)
//! - `llm`: Provider-routed text generation gateway
//! - `search`: Web evidence retrieval and trust scoring
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Ask a research question
//! researcher ask "Salience fell by 6 points in Q3 2025 for New Look"
//!
//! # Stream lifecycle events as they arrive
//! researcher ask --stream "..."
//!
//! # Inspect the trusted-source registry
//! researcher sources
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod llm;
pub mod search;

// Re-export main types at crate root for convenience
pub use crate::core::{Researcher, ResearcherSettings};
pub use domain::{
    Category, Hypothesis, HypothesisSet, ParsedIntent, PipelineEvent, ResearchReport,
    ResearchRequest, RunSummary, TrustTier, TrustedDomain,
};
pub use llm::{LlmGateway, Provider};
pub use search::trust::TrustRegistry;
pub use search::EvidenceRetriever;
