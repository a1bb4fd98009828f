//! Deterministic query transforms.
//!
//! Used both to bake broad fallback queries into hypotheses and as the
//! runtime second-pass refinement when a hypothesis has no broad query of
//! its own. Pure string work; no I/O.

/// Broaden a query by appending brand, time period, a region token, and a
/// generic market qualifier.
///
/// The region token is only appended when the region is not already
/// present (case-insensitively) in the original query.
pub fn broaden_query(original: &str, brand: &str, time_period: &str, region: &str) -> String {
    let region_token = if !region.is_empty()
        && !original.to_lowercase().contains(&region.to_lowercase())
    {
        region
    } else {
        ""
    };

    [original, brand, time_period, region_token, "retail"]
        .iter()
        .filter(|part| !part.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Steer a query toward trusted outlets by ORing `site:` filters.
///
/// Returns the original query unchanged when no domains are given.
pub fn trusted_site_query(original: &str, domains: &[String]) -> String {
    if domains.is_empty() {
        return original.to_string();
    }

    let sites = domains
        .iter()
        .map(|d| format!("site:{d}"))
        .collect::<Vec<_>>()
        .join(" OR ");

    format!("{original} ({sites})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broaden_appends_context() {
        let q = broaden_query("store closures", "new look", "Q3 2025", "UK");
        assert_eq!(q, "store closures new look Q3 2025 UK retail");
    }

    #[test]
    fn test_region_not_duplicated() {
        let q = broaden_query("UK fashion spending", "new look", "Q3 2025", "UK");
        assert_eq!(q, "UK fashion spending new look Q3 2025 retail");

        // Case-insensitive containment
        let q = broaden_query("uk fashion spending", "new look", "Q3 2025", "UK");
        assert!(!q.ends_with("UK retail"));
    }

    #[test]
    fn test_broaden_is_deterministic() {
        let a = broaden_query("x", "b", "t", "r");
        let b = broaden_query("x", "b", "t", "r");
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_parts_skipped() {
        let q = broaden_query("ad spend", "zara", "", "");
        assert_eq!(q, "ad spend zara retail");
    }

    #[test]
    fn test_trusted_site_query() {
        let q = trusted_site_query(
            "new look closures",
            &["reuters.com".to_string(), "bbc.co.uk".to_string()],
        );
        assert_eq!(q, "new look closures (site:reuters.com OR site:bbc.co.uk)");
    }

    #[test]
    fn test_trusted_site_query_no_domains() {
        assert_eq!(trusted_site_query("q", &[]), "q");
    }
}
