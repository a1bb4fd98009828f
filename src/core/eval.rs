//! Heuristic report scoring for provider comparisons.
//!
//! Used by eval tooling to compare two providers over a fixed question
//! set without human judging. Scores are rough by construction.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::{Category, ResearchReport};
use crate::search::trust::host_of;

/// Heuristic 0-100 score with its inputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalScore {
    pub score: u32,
    pub drivers_total: usize,
    pub sections_nonempty: usize,
    pub citations_total: usize,
    pub unique_domains: usize,
}

/// Score a report on citations, section coverage, driver count, and
/// source diversity.
pub fn score_report(report: &ResearchReport) -> EvalScore {
    let mut drivers_total = 0;
    let mut sections_nonempty = 0;
    let mut citations: Vec<&str> = Vec::new();

    for category in Category::ALL {
        let drivers = report.summary.get(category);
        drivers_total += drivers.len();
        if !drivers.is_empty() {
            sections_nonempty += 1;
        }
        for driver in drivers {
            citations.extend(driver.source_urls.iter().map(String::as_str));
        }
    }

    let unique_domains: HashSet<String> =
        citations.iter().filter_map(|url| host_of(url)).collect();

    let citations_total = citations.len();
    let unique = unique_domains.len();

    let mut score: i64 = 0;
    score += (citations_total.min(6) * 5) as i64; // up to 30
    score += (sections_nonempty * 10) as i64; // up to 30
    score += (drivers_total.min(6) * 3) as i64; // up to 18
    score += (unique.min(5) * 2) as i64; // up to 10

    if citations_total == 0 {
        score -= 10;
    }
    if drivers_total == 0 {
        score -= 15;
    }

    EvalScore {
        score: score.clamp(0, 100) as u32,
        drivers_total,
        sections_nonempty,
        citations_total,
        unique_domains: unique,
    }
}
