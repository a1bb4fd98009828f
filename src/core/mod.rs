//! Pipeline logic.
//!
//! This module contains:
//! - Classifier: help / coaching / pipeline routing
//! - Generator: three-category hypothesis generation
//! - Validator: multi-pass evidence search and LLM judging
//! - QualityGate: minimum trusted-evidence ratio enforcement
//! - Summary: driver-schema reshaping
//! - Orchestrator: the `Researcher` entry points

pub mod classifier;
pub mod eval;
pub mod generator;
pub mod orchestrator;
pub mod quality;
pub mod summary;
pub mod validator;

// Re-export commonly used types
pub use classifier::{classify, Route};
pub use eval::{score_report, EvalScore};
pub use generator::{parse_intent, GeneratorOptions, HypothesisGenerator};
pub use orchestrator::{Researcher, ResearcherSettings};
pub use quality::QualityGate;
pub use summary::build_summary;
pub use validator::{HypothesisValidator, ValidationContext};
