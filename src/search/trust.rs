//! Source trust scoring and the trusted-source registry.
//!
//! The registry is process-wide mutable state shared by concurrent runs.
//! Readers take an `Arc` snapshot of the whole list; writers swap the
//! reference wholesale, so a reader can never observe a half-updated
//! registry. A per-request override list is used as a run-local snapshot
//! and never touches the shared registry.

use std::sync::{Arc, RwLock};

use crate::domain::{SourceTrust, TrustTier, TrustedDomain};

/// Score assigned to domains absent from the registry
pub const UNVERIFIED_SCORE: u32 = 30;

/// Domains excluded outright from evidence, exact or subdomain match.
/// This is a hard filter, not a scoring input.
const SOCIAL_DOMAINS: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "tiktok.com",
    "reddit.com",
    "pinterest.com",
    "linkedin.com",
    "snapchat.com",
    "threads.net",
];

/// Process-wide trusted-source list behind an atomically swapped snapshot
#[derive(Debug, Clone)]
pub struct TrustRegistry {
    inner: Arc<RwLock<Arc<Vec<TrustedDomain>>>>,
}

impl Default for TrustRegistry {
    fn default() -> Self {
        Self::new(default_sources())
    }
}

impl TrustRegistry {
    pub fn new(sources: Vec<TrustedDomain>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(sources))),
        }
    }

    /// A complete, consistent snapshot of the current list
    pub fn snapshot(&self) -> Arc<Vec<TrustedDomain>> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the whole list atomically
    pub fn replace(&self, sources: Vec<TrustedDomain>) {
        let next = Arc::new(sources);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Restore the curated default list
    pub fn reset(&self) {
        self.replace(default_sources());
    }
}

/// The curated default registry
pub fn default_sources() -> Vec<TrustedDomain> {
    fn entry(domain: &str, name: &str, trust_score: u32, tier: TrustTier) -> TrustedDomain {
        TrustedDomain {
            domain: domain.to_string(),
            name: name.to_string(),
            trust_score,
            tier,
        }
    }

    vec![
        entry("reuters.com", "Reuters", 95, TrustTier::Trusted),
        entry("bbc.co.uk", "BBC", 92, TrustTier::Trusted),
        entry("ft.com", "Financial Times", 90, TrustTier::Trusted),
        entry("bloomberg.com", "Bloomberg", 88, TrustTier::Trusted),
        entry("wsj.com", "The Wall Street Journal", 86, TrustTier::Trusted),
        entry("theguardian.com", "The Guardian", 84, TrustTier::Trusted),
        entry("retailgazette.co.uk", "Retail Gazette", 74, TrustTier::Reputable),
        entry("drapersonline.com", "Drapers", 72, TrustTier::Reputable),
        entry("businessoffashion.com", "Business of Fashion", 70, TrustTier::Reputable),
        entry("fashionnetwork.com", "Fashion Network", 66, TrustTier::Reputable),
        entry("marketingweek.com", "Marketing Week", 64, TrustTier::Reputable),
        entry("campaignlive.co.uk", "Campaign", 62, TrustTier::Reputable),
    ]
}

/// Host of a URL, lowercased, without a leading "www."
pub fn host_of(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Score a URL against a registry snapshot.
///
/// Matches the host exactly or as a subdomain of a registry entry; first
/// match wins. Unmatched hosts get the low default score and tier
/// `Unverified`.
pub fn score_source(url: &str, sources: &[TrustedDomain]) -> SourceTrust {
    let host = match host_of(url) {
        Some(host) => host,
        None => {
            return SourceTrust {
                trust_score: UNVERIFIED_SCORE,
                tier: TrustTier::Unverified,
                source_name: String::new(),
                is_trusted: false,
            }
        }
    };

    for entry in sources {
        if host == entry.domain || host.ends_with(&format!(".{}", entry.domain)) {
            return SourceTrust {
                trust_score: entry.trust_score,
                tier: entry.tier,
                source_name: entry.name.clone(),
                is_trusted: entry.tier == TrustTier::Trusted,
            };
        }
    }

    SourceTrust {
        trust_score: UNVERIFIED_SCORE,
        tier: TrustTier::Unverified,
        source_name: host,
        is_trusted: false,
    }
}

/// Whether a URL belongs to a social-media platform (exact or subdomain)
pub fn is_social_media(url: &str) -> bool {
    let host = match host_of(url) {
        Some(host) => host,
        None => return false,
    };

    SOCIAL_DOMAINS
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
}

/// Domains of the top trusted-tier entries, best first
pub fn top_trusted_domains(sources: &[TrustedDomain], limit: usize) -> Vec<String> {
    let mut trusted: Vec<&TrustedDomain> = sources
        .iter()
        .filter(|s| s.tier == TrustTier::Trusted)
        .collect();
    trusted.sort_by(|a, b| b.trust_score.cmp(&a.trust_score));
    trusted
        .into_iter()
        .take(limit)
        .map(|s| s.domain.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_www_prefix_is_ignored() {
        let sources = default_sources();
        let with_www = score_source("https://www.reuters.com/x", &sources);
        let bare = score_source("https://reuters.com/x", &sources);

        assert_eq!(with_www, bare);
        assert_eq!(with_www.tier, TrustTier::Trusted);
        assert!(with_www.is_trusted);
    }

    #[test]
    fn test_subdomain_suffix_match() {
        let sources = default_sources();
        let scored = score_source("https://uk.reuters.com/business", &sources);
        assert_eq!(scored.source_name, "Reuters");
        assert_eq!(scored.trust_score, 95);
    }

    #[test]
    fn test_unknown_domain_is_unverified() {
        let sources = default_sources();
        let scored = score_source("https://example-blog.net/post", &sources);
        assert_eq!(scored.tier, TrustTier::Unverified);
        assert_eq!(scored.trust_score, UNVERIFIED_SCORE);
        assert!(!scored.is_trusted);
        assert_eq!(scored.source_name, "example-blog.net");
    }

    #[test]
    fn test_social_media_blocklist() {
        assert!(is_social_media("https://m.facebook.com/brandpage"));
        assert!(is_social_media("https://x.com/someone/status/1"));
        assert!(is_social_media("https://www.tiktok.com/@brand"));
        assert!(!is_social_media("https://reuters.com/x"));
        // Suffix matching must not catch lookalike registrable domains
        assert!(!is_social_media("https://notx.com/post"));
    }

    #[test]
    fn test_snapshot_survives_replace() {
        let registry = TrustRegistry::default();
        let before = registry.snapshot();

        registry.replace(vec![TrustedDomain {
            domain: "example.org".into(),
            name: "Example".into(),
            trust_score: 50,
            tier: TrustTier::Custom,
        }]);

        // Old snapshot is unchanged; new snapshot sees the replacement
        assert!(before.iter().any(|s| s.domain == "reuters.com"));
        let after = registry.snapshot();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].domain, "example.org");

        registry.reset();
        assert!(registry.snapshot().iter().any(|s| s.domain == "reuters.com"));
    }

    #[test]
    fn test_top_trusted_domains_ordered() {
        let domains = top_trusted_domains(&default_sources(), 3);
        assert_eq!(domains, vec!["reuters.com", "bbc.co.uk", "ft.com"]);
    }
}
