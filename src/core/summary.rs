//! Summary building: validated findings reshaped into the external
//! driver schema. No filtering happens here; the quality gate already
//! ran.

use crate::domain::{Category, DriverEntry, Summary, ValidatedSet};

/// Confidence label attached to every driver entry
const CONFIDENCE: &str = "medium";

/// Reshape validated findings into the driver summary
pub fn build_summary(validated: &ValidatedSet) -> Summary {
    let mut summary = Summary::default();

    for category in Category::ALL {
        let drivers = summary.get_mut(category);
        for finding in validated.get(category) {
            let driver = if finding.evidence.is_empty() {
                finding.hypothesis.clone()
            } else {
                finding.evidence.clone()
            };

            drivers.push(DriverEntry {
                driver,
                hypothesis: finding.hypothesis.clone(),
                source_urls: if finding.source.is_empty() {
                    vec![]
                } else {
                    vec![finding.source.clone()]
                },
                source_title: finding.source_title.clone(),
                confidence: CONFIDENCE.to_string(),
                status: finding.status.clone(),
            });
        }
    }

    summary
}
