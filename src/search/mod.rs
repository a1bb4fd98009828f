//! Web evidence retrieval.
//!
//! A [`SearchBackend`] performs one raw web search and reports whatever
//! shape the provider returned: optional synthesized analysis prose plus a
//! list of cited URLs. The [`EvidenceRetriever`] turns that into a scored,
//! filtered, ordered list of [`EvidenceSource`]s, retrying rate limits
//! with exponential backoff.

pub mod query;
pub mod trust;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{EvidenceSource, RunMetrics, TrustedDomain};

use trust::{is_social_media, score_source};

/// Longest synthesized-analysis content carried on a pseudo-source
const ANALYSIS_CONTENT_CHARS: usize = 6000;

/// Errors from the search backend
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search rate limited")]
    RateLimited,

    #[error("search API error ({status}): {detail}")]
    Api { status: u16, detail: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One raw source URL from a search response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSource {
    pub title: String,
    pub url: String,
}

/// Raw, provider-shaped search output before normalization
#[derive(Debug, Clone, Default)]
pub struct RawSearch {
    /// Synthesized analysis prose, when the provider produced any
    pub analysis: Option<String>,

    /// Cited sources in discovery order, de-duplicated by URL
    pub sources: Vec<RawSource>,
}

/// An external web-search capability
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str) -> Result<RawSearch, SearchError>;
}

/// Backoff schedule for rate-limited searches
#[derive(Debug, Clone)]
pub struct SearchRetry {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for SearchRetry {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 2000,
            backoff_multiplier: 2.0,
        }
    }
}

impl SearchRetry {
    /// Delay before retry `attempt` (1-indexed): 2s, 4s, 8s by default
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_millis(delay as u64)
    }
}

/// Wraps a [`SearchBackend`] with retry, normalization, social-media
/// filtering, trust scoring, and ordering.
pub struct EvidenceRetriever {
    backend: Arc<dyn SearchBackend>,
    retry: SearchRetry,
    max_sources: usize,
}

impl EvidenceRetriever {
    pub fn new(backend: Arc<dyn SearchBackend>, max_sources: usize) -> Self {
        Self {
            backend,
            retry: SearchRetry::default(),
            max_sources,
        }
    }

    pub fn with_retry(mut self, retry: SearchRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Run one logical search and return scored evidence, best first.
    ///
    /// Rate limits are retried with backoff up to the configured bound and
    /// then propagated; any other error propagates immediately. The result
    /// may be empty, which is a normal outcome.
    pub async fn search(
        &self,
        search_query: &str,
        trust: &[TrustedDomain],
        metrics: &RunMetrics,
    ) -> Result<Vec<EvidenceSource>, SearchError> {
        let mut attempt = 0u32;
        let raw = loop {
            metrics.record_search();
            match self.backend.search(search_query).await {
                Ok(raw) => break raw,
                Err(SearchError::RateLimited) if attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        query = %truncate_chars(search_query, 60),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "search rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        let evidence = self.normalize(raw, trust);
        debug!(
            query = %truncate_chars(search_query, 60),
            sources = evidence.len(),
            "search complete"
        );
        Ok(evidence)
    }

    fn normalize(&self, raw: RawSearch, trust: &[TrustedDomain]) -> Vec<EvidenceSource> {
        // Hard filter: social platforms are excluded, never down-scored
        let candidates: Vec<RawSource> = raw
            .sources
            .into_iter()
            .filter(|s| !s.url.is_empty() && !is_social_media(&s.url))
            .collect();

        let mut out: Vec<EvidenceSource> = Vec::with_capacity(candidates.len() + 1);

        // When the provider synthesized analysis prose, expose it as a
        // leading pseudo-source anchored to the top real citation so the
        // judge can read a coherent narrative.
        let analysis = raw.analysis.filter(|a| !a.trim().is_empty());
        let pseudo_url = if let Some(analysis) = analysis {
            let url = candidates
                .first()
                .map(|s| s.url.clone())
                .unwrap_or_default();
            let content = truncate_chars(&analysis, ANALYSIS_CONTENT_CHARS);
            let scored = score_source(&url, trust);
            out.push(EvidenceSource {
                title: "Web Search Analysis".to_string(),
                url: url.clone(),
                content: content.clone(),
                raw_content: content,
                trust_score: scored.trust_score,
                tier: scored.tier,
                source_name: scored.source_name,
                is_trusted: scored.is_trusted,
                synthesized: true,
            });
            Some(url)
        } else {
            None
        };

        for candidate in candidates {
            if pseudo_url.as_deref() == Some(candidate.url.as_str()) {
                continue;
            }
            let scored = score_source(&candidate.url, trust);
            out.push(EvidenceSource {
                title: candidate.title,
                url: candidate.url,
                content: String::new(),
                raw_content: String::new(),
                trust_score: scored.trust_score,
                tier: scored.tier,
                source_name: scored.source_name,
                is_trusted: scored.is_trusted,
                synthesized: false,
            });
        }

        // Stable: discovery order breaks score ties
        out.sort_by(|a, b| b.trust_score.cmp(&a.trust_score));
        out.truncate(self.max_sources);
        out
    }
}

/// Truncate to at most `max` characters on a char boundary
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Web search via the OpenAI Responses API `web_search` tool.
///
/// Handles the two response shapes seen in the wild: structured
/// `web_search_call.action.sources` entries and `url_citation` annotations
/// inline in message content (the Azure-style deployments emit the
/// latter, and require the `web_search_preview` tool type).
pub struct OpenAiWebSearch {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    azure: bool,
    temperature: Option<f64>,
    user_location: Option<Value>,
}

impl OpenAiWebSearch {
    pub fn new(api_key: String, model: String, base_url: Option<String>, azure: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model,
            azure,
            temperature: Some(0.2),
            user_location: None,
        }
    }

    /// Build from `OPENAI_API_KEY`; `None` when the key is absent
    pub fn from_env(model: String) -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?;
        let base_url = std::env::var("OPENAI_BASE_URL").ok();
        let azure = std::env::var("AZURE_OPENAI_ENDPOINT").is_ok();
        Some(Self::new(api_key, model, base_url, azure))
    }

    pub fn with_user_location(mut self, location: Value) -> Self {
        self.user_location = Some(location);
        self
    }

    fn request_body(&self, search_query: &str, with_temperature: bool) -> Value {
        let tool_type = if self.azure {
            "web_search_preview"
        } else {
            "web_search"
        };
        let mut tool = json!({"type": tool_type});
        if let Some(location) = &self.user_location {
            tool["user_location"] = location.clone();
        }

        let mut body = json!({
            "model": self.model,
            "tools": [tool],
            "tool_choice": "auto",
            "include": ["web_search_call.action.sources"],
            "input": search_query,
        });
        if with_temperature {
            if let Some(temperature) = self.temperature {
                body["temperature"] = json!(temperature);
            }
        }
        body
    }

    async fn send(&self, body: &Value) -> Result<(u16, String), SearchError> {
        let response = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await?;
        Ok((status, text))
    }
}

#[async_trait]
impl SearchBackend for OpenAiWebSearch {
    async fn search(&self, search_query: &str) -> Result<RawSearch, SearchError> {
        let (mut status, mut text) = self
            .send(&self.request_body(search_query, true))
            .await?;

        // Some search-capable models reject temperature outright; retry
        // once without it.
        if status == 400 && text.contains("temperature") && self.temperature.is_some() {
            debug!("model rejected temperature, retrying without it");
            (status, text) = self.send(&self.request_body(search_query, false)).await?;
        }

        if status == 429 {
            return Err(SearchError::RateLimited);
        }
        if !(200..300).contains(&status) {
            return Err(SearchError::Api {
                status,
                detail: truncate_chars(&text, 500),
            });
        }

        let parsed: Value = serde_json::from_str(&text).map_err(|e| SearchError::Api {
            status,
            detail: format!("unparseable response body: {e}"),
        })?;

        Ok(parse_search_response(&parsed))
    }
}

/// Normalize a Responses API payload into analysis text plus a
/// URL-de-duplicated source list.
fn parse_search_response(payload: &Value) -> RawSearch {
    let mut sources: Vec<RawSource> = Vec::new();
    let mut analysis: Option<String> = None;

    let mut push_source = |title: &str, url: &str| {
        if url.is_empty() || sources.iter().any(|s| s.url == url) {
            return;
        }
        sources.push(RawSource {
            title: title.to_string(),
            url: url.to_string(),
        });
    };

    for item in payload["output"].as_array().into_iter().flatten() {
        match item["type"].as_str() {
            Some("web_search_call") => {
                for s in item["action"]["sources"].as_array().into_iter().flatten() {
                    push_source(
                        s["title"].as_str().unwrap_or_default(),
                        s["url"].as_str().unwrap_or_default(),
                    );
                }
            }
            Some("message") => {
                for content in item["content"].as_array().into_iter().flatten() {
                    if let Some(text) = content["text"].as_str() {
                        if !text.is_empty() {
                            analysis = Some(text.to_string());
                        }
                    }
                    for annot in content["annotations"].as_array().into_iter().flatten() {
                        if annot["type"].as_str() == Some("url_citation") {
                            push_source(
                                annot["title"].as_str().unwrap_or_default(),
                                annot["url"].as_str().unwrap_or_default(),
                            );
                        }
                    }
                }
            }
            _ => {}
        }
    }

    RawSearch { analysis, sources }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    use crate::domain::TrustTier;

    struct CannedSearch {
        raw: RawSearch,
    }

    #[async_trait]
    impl SearchBackend for CannedSearch {
        async fn search(&self, _search_query: &str) -> Result<RawSearch, SearchError> {
            Ok(self.raw.clone())
        }
    }

    struct FlakySearch {
        failures: std::sync::atomic::AtomicU32,
    }

    #[async_trait]
    impl SearchBackend for FlakySearch {
        async fn search(&self, _search_query: &str) -> Result<RawSearch, SearchError> {
            use std::sync::atomic::Ordering;
            if self.failures.fetch_sub(1, Ordering::SeqCst) > 1 {
                Err(SearchError::RateLimited)
            } else {
                Ok(RawSearch::default())
            }
        }
    }

    fn fast_retry() -> SearchRetry {
        SearchRetry {
            max_retries: 3,
            initial_delay_ms: 1,
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_retry_delays_double() {
        let retry = SearchRetry::default();
        assert_eq!(retry.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_rate_limit_retried_then_recovers() {
        let backend = Arc::new(FlakySearch {
            failures: std::sync::atomic::AtomicU32::new(3),
        });
        let retriever = EvidenceRetriever::new(backend, 6).with_retry(fast_retry());
        let metrics = RunMetrics::start(Uuid::new_v4(), "openai", "q");

        let sources = retriever
            .search("q", &trust::default_sources(), &metrics)
            .await
            .unwrap();

        assert!(sources.is_empty());
        assert_eq!(metrics.web_searches(), 3);
    }

    #[tokio::test]
    async fn test_non_rate_limit_error_propagates() {
        struct Failing;
        #[async_trait]
        impl SearchBackend for Failing {
            async fn search(&self, _q: &str) -> Result<RawSearch, SearchError> {
                Err(SearchError::Api {
                    status: 500,
                    detail: "boom".into(),
                })
            }
        }

        let retriever = EvidenceRetriever::new(Arc::new(Failing), 6).with_retry(fast_retry());
        let metrics = RunMetrics::start(Uuid::new_v4(), "openai", "q");
        let err = retriever
            .search("q", &trust::default_sources(), &metrics)
            .await
            .unwrap_err();

        assert!(matches!(err, SearchError::Api { status: 500, .. }));
        assert_eq!(metrics.web_searches(), 1);
    }

    #[tokio::test]
    async fn test_analysis_becomes_leading_pseudo_source() {
        let backend = Arc::new(CannedSearch {
            raw: RawSearch {
                analysis: Some("The market softened in Q3.".to_string()),
                sources: vec![
                    RawSource {
                        title: "Reuters piece".into(),
                        url: "https://www.reuters.com/a".into(),
                    },
                    RawSource {
                        title: "Blog".into(),
                        url: "https://example.net/b".into(),
                    },
                ],
            },
        });
        let retriever = EvidenceRetriever::new(backend, 6);
        let metrics = RunMetrics::start(Uuid::new_v4(), "openai", "q");

        let sources = retriever
            .search("q", &trust::default_sources(), &metrics)
            .await
            .unwrap();

        // Pseudo-source carries the analysis and the top citation's URL;
        // that citation is not listed twice.
        assert!(sources[0].synthesized);
        assert_eq!(sources[0].url, "https://www.reuters.com/a");
        assert_eq!(sources[0].content, "The market softened in Q3.");
        assert!(sources[0].is_trusted);
        assert_eq!(
            sources
                .iter()
                .filter(|s| s.url == "https://www.reuters.com/a")
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_social_sources_excluded_and_sorted_by_trust() {
        let backend = Arc::new(CannedSearch {
            raw: RawSearch {
                analysis: None,
                sources: vec![
                    RawSource {
                        title: "fb".into(),
                        url: "https://m.facebook.com/page".into(),
                    },
                    RawSource {
                        title: "blog".into(),
                        url: "https://example.net/x".into(),
                    },
                    RawSource {
                        title: "bbc".into(),
                        url: "https://www.bbc.co.uk/news/1".into(),
                    },
                ],
            },
        });
        let retriever = EvidenceRetriever::new(backend, 6);
        let metrics = RunMetrics::start(Uuid::new_v4(), "openai", "q");

        let sources = retriever
            .search("q", &trust::default_sources(), &metrics)
            .await
            .unwrap();

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].tier, TrustTier::Trusted);
        assert_eq!(sources[0].url, "https://www.bbc.co.uk/news/1");
        assert!(sources.iter().all(|s| !s.url.contains("facebook")));
    }

    #[test]
    fn test_parse_both_citation_shapes() {
        let payload = json!({
            "output": [
                {
                    "type": "web_search_call",
                    "action": {"sources": [
                        {"title": "A", "url": "https://a.com/1"},
                    ]}
                },
                {
                    "type": "message",
                    "content": [{
                        "text": "Analysis prose.",
                        "annotations": [
                            {"type": "url_citation", "title": "B", "url": "https://b.com/2"},
                            {"type": "url_citation", "title": "A again", "url": "https://a.com/1"}
                        ]
                    }]
                }
            ]
        });

        let raw = parse_search_response(&payload);
        assert_eq!(raw.analysis.as_deref(), Some("Analysis prose."));
        assert_eq!(raw.sources.len(), 2);
        assert_eq!(raw.sources[0].url, "https://a.com/1");
        assert_eq!(raw.sources[1].url, "https://b.com/2");
    }
}
