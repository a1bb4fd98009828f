//! Aggregate evidence-quality gate.
//!
//! Enforces a minimum percentage of trusted-source-backed findings by
//! removing the weakest unverified findings, one at a time. Removal only:
//! the gate never fabricates or upgrades evidence, and never drops below
//! one remaining finding just to hit the ratio.

use tracing::info;

use crate::domain::{Category, DroppedFinding, QualityFilterNotice, ValidatedSet};

/// Floor below which the gate stops removing findings
const MIN_REMAINING: usize = 2;

/// Post-validation filter on the trusted-evidence ratio
#[derive(Debug, Clone)]
pub struct QualityGate {
    /// Minimum percentage of findings backed by a trusted source
    pub min_verified_pct: f64,
}

impl QualityGate {
    pub fn new(min_verified_pct: f64) -> Self {
        Self { min_verified_pct }
    }

    /// Percentage of findings whose accepted source is trusted
    pub fn trusted_ratio_pct(validated: &ValidatedSet) -> f64 {
        let total = validated.total();
        if total == 0 {
            return 0.0;
        }
        validated.trusted_count() as f64 * 100.0 / total as f64
    }

    /// Apply the gate, mutating the set in place.
    ///
    /// Returns a notice when any finding was dropped.
    pub fn apply(&self, validated: &mut ValidatedSet) -> Option<QualityFilterNotice> {
        let total = validated.total();
        if total == 0 || self.min_verified_pct <= 0.0 {
            return None;
        }

        let ratio_before = Self::trusted_ratio_pct(validated);
        let mut dropped = Vec::new();

        while Self::trusted_ratio_pct(validated) < self.min_verified_pct
            && validated.total() >= MIN_REMAINING
        {
            match weakest_unverified(validated) {
                Some((category, index)) => {
                    let finding = validated.get_mut(category).remove(index);
                    dropped.push(DroppedFinding {
                        category,
                        hypothesis: finding.hypothesis,
                        trust_score: finding.trust_score,
                    });
                }
                // Everything left is trusted; nothing more can be removed
                None => break,
            }
        }

        if dropped.is_empty() {
            return None;
        }

        let notice = QualityFilterNotice {
            threshold_pct: self.min_verified_pct,
            ratio_before_pct: ratio_before,
            ratio_after_pct: Self::trusted_ratio_pct(validated),
            dropped,
        };
        info!(
            dropped = notice.dropped.len(),
            ratio_before = notice.ratio_before_pct,
            ratio_after = notice.ratio_after_pct,
            "quality gate dropped unverified findings"
        );
        Some(notice)
    }
}

/// Locate the single lowest-trust-score unverified finding
fn weakest_unverified(validated: &ValidatedSet) -> Option<(Category, usize)> {
    let mut weakest: Option<(Category, usize, u32)> = None;

    for category in Category::ALL {
        for (index, finding) in validated.get(category).iter().enumerate() {
            if finding.is_trusted {
                continue;
            }
            let beats = weakest
                .map(|(_, _, score)| finding.trust_score < score)
                .unwrap_or(true);
            if beats {
                weakest = Some((category, index, finding.trust_score));
            }
        }
    }

    weakest.map(|(category, index, _)| (category, index))
}
