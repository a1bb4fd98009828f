//! Hypothesis validation.
//!
//! Each hypothesis runs through up to three strictly ordered passes:
//! a specific search, a broad-query escalation when the first pass was
//! weak or judged false, and a trusted-source steering pass that may swap
//! in better evidence but never downgrades an accepted result. Hypotheses
//! are processed concurrently under a bounded worker pool; a failure in
//! one hypothesis never aborts its siblings.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::domain::{
    Category, EvidenceSource, Hypothesis, HypothesisOutcome, HypothesisSet, ParsedIntent,
    PipelineEvent, RunMetrics, SourceTrust, TrustTier, TrustedDomain, ValidatedSet,
    ValidationResult,
};
use crate::llm::{LlmGateway, Provider};
use crate::search::query::{broaden_query, trusted_site_query};
use crate::search::trust::top_trusted_domains;
use crate::search::{truncate_chars, EvidenceRetriever};

/// Sources shown to the judge per attempt
const JUDGE_SOURCES: usize = 3;

/// Content window per regular source in the judge prompt
const SNIPPET_CHARS: usize = 1500;

/// Content window for synthesized analysis pseudo-sources
const ANALYSIS_CHARS: usize = 6000;

/// `site:` filters used by the trusted-source steering pass
const STEER_DOMAINS: usize = 4;

/// Evidence cap after merging the broad second pass
const COMBINED_SOURCES: usize = 4;

/// Everything one validation run needs, passed explicitly into every
/// worker closure (never ambient).
#[derive(Clone)]
pub struct ValidationContext {
    pub intent: ParsedIntent,
    pub provider: Provider,
    pub trust: Arc<Vec<TrustedDomain>>,
    pub metrics: Arc<RunMetrics>,

    /// Concurrent worker permits; 1 degenerates to sequential processing
    pub workers: usize,

    /// Skip escalation passes and trim work for eval runs
    pub eval_mode: bool,

    /// Streamed per-hypothesis results, when a consumer is listening
    pub events: Option<mpsc::Sender<PipelineEvent>>,
}

/// Validates hypotheses against retrieved web evidence
#[derive(Clone)]
pub struct HypothesisValidator {
    gateway: Arc<LlmGateway>,
    retriever: Arc<EvidenceRetriever>,
}

impl HypothesisValidator {
    pub fn new(gateway: Arc<LlmGateway>, retriever: Arc<EvidenceRetriever>) -> Self {
        Self { gateway, retriever }
    }

    /// Validate every hypothesis in the set.
    ///
    /// Returns the validated findings plus one outcome per hypothesis.
    /// Outcomes complete in no particular order; the returned set groups
    /// them by category.
    pub async fn validate_all(
        &self,
        hypotheses: &HypothesisSet,
        ctx: &ValidationContext,
    ) -> (ValidatedSet, Vec<HypothesisOutcome>) {
        let mut working = hypotheses.clone();
        if ctx.eval_mode {
            working.truncate_each(2);
        }

        let tasks = working.tasks();
        let total = tasks.len();
        debug!(total, workers = ctx.workers, "validating hypotheses");

        let semaphore = Arc::new(Semaphore::new(ctx.workers.max(1)));
        let mut join_set = JoinSet::new();
        let mut task_identity: HashMap<tokio::task::Id, (Category, String)> = HashMap::new();

        for (category, hypothesis) in tasks {
            let validator = self.clone();
            let ctx = ctx.clone();
            let semaphore = Arc::clone(&semaphore);
            let identity = (category, hypothesis.hypothesis.clone());

            let handle = join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                validator.process_one(category, &hypothesis, &ctx).await
            });
            task_identity.insert(handle.id(), identity);
        }

        let mut validated = ValidatedSet::default();
        let mut outcomes = Vec::with_capacity(total);
        let mut completed = 0usize;

        while let Some(joined) = join_set.join_next_with_id().await {
            completed += 1;
            let outcome = match joined {
                Ok((_, outcome)) => outcome,
                Err(join_err) => {
                    // A panicked worker is contained to its own hypothesis
                    let (category, hypothesis) = task_identity
                        .get(&join_err.id())
                        .cloned()
                        .unwrap_or((Category::Market, String::new()));
                    warn!(error = %join_err, category = category.key(), "hypothesis worker failed");
                    HypothesisOutcome::errored(category, hypothesis, join_err.to_string())
                }
            };

            if let Some(finding) = outcome.into_finding() {
                validated.get_mut(outcome.category).push(finding);
            }

            if let Some(tx) = &ctx.events {
                // A dropped receiver abandons the stream, not the run
                let _ = tx
                    .send(PipelineEvent::HypothesisResult {
                        outcome: outcome.clone(),
                        completed,
                        total,
                    })
                    .await;
            }

            outcomes.push(outcome);
        }

        (validated, outcomes)
    }

    /// Run the full pass sequence for one hypothesis. Passes are strictly
    /// ordered; search failures degrade to empty evidence.
    async fn process_one(
        &self,
        category: Category,
        hypothesis: &Hypothesis,
        ctx: &ValidationContext,
    ) -> HypothesisOutcome {
        let query = if hypothesis.search_query.trim().is_empty() {
            hypothesis.hypothesis.clone()
        } else {
            hypothesis.search_query.clone()
        };

        if query.trim().is_empty() {
            return HypothesisOutcome::errored(
                category,
                hypothesis.hypothesis.clone(),
                "empty_query".to_string(),
            );
        }

        let mut searches_used = 0u32;

        // Pass 1: specific query
        let mut sources = self.search_tolerant(&query, ctx, &mut searches_used).await;
        let mut validation = if sources.is_empty() {
            ValidationResult::not_validated()
        } else {
            self.judge(hypothesis, &sources, ctx).await
        };

        // Pass 2: broad escalation when the first pass was weak or judged
        // false. Accept the re-judgement only if it validates.
        let mut second_pass_used = false;
        let mut second_query = None;
        if !ctx.eval_mode && (sources.len() < 2 || !validation.validated) {
            let broad = hypothesis
                .broad_query
                .clone()
                .filter(|q| !q.trim().is_empty())
                .unwrap_or_else(|| {
                    broaden_query(
                        &query,
                        &ctx.intent.brand,
                        ctx.intent.time_period.as_deref().unwrap_or(""),
                        ctx.intent.region.as_deref().unwrap_or("UK"),
                    )
                });

            if !broad.is_empty() && broad != query {
                second_pass_used = true;
                ctx.metrics.record_escalation();

                let extra = self.search_tolerant(&broad, ctx, &mut searches_used).await;
                let mut combined = sources.clone();
                for source in extra {
                    if !combined.iter().any(|s| s.url == source.url) {
                        combined.push(source);
                    }
                }
                combined.truncate(COMBINED_SOURCES);

                if !combined.is_empty() {
                    let rejudged = self.judge(hypothesis, &combined, ctx).await;
                    if rejudged.validated {
                        validation = rejudged;
                        sources = combined;
                    }
                }
                second_query = Some(broad);
            }
        }

        // Pass 3: steer toward trusted outlets. Swaps the accepted
        // evidence only when the steered result is trusted and
        // re-validates; never discards an accepted result.
        let mut trusted_steer_used = false;
        let leading_untrusted = sources
            .first()
            .map(|s| s.tier != TrustTier::Trusted)
            .unwrap_or(false);
        if !ctx.eval_mode && validation.validated && leading_untrusted {
            let domains = top_trusted_domains(&ctx.trust, STEER_DOMAINS);
            if !domains.is_empty() {
                trusted_steer_used = true;
                ctx.metrics.record_escalation();

                let steered_query = trusted_site_query(&query, &domains);
                let steered = self
                    .search_tolerant(&steered_query, ctx, &mut searches_used)
                    .await;

                let steered_trusted = steered
                    .first()
                    .map(|s| s.tier == TrustTier::Trusted)
                    .unwrap_or(false);
                if steered_trusted {
                    let rejudged = self.judge(hypothesis, &steered, ctx).await;
                    if rejudged.validated {
                        validation = rejudged;
                        sources = steered;
                    }
                }
            }
        }

        let leading = sources.first();
        HypothesisOutcome {
            category,
            hypothesis: hypothesis.hypothesis.clone(),
            search_query: query,
            validated: validation.validated,
            evidence: validation.evidence,
            source: leading.map(|s| s.url.clone()),
            source_title: leading.map(|s| s.title.clone()),
            source_trust: leading.map(|s| SourceTrust {
                trust_score: s.trust_score,
                tier: s.tier,
                source_name: s.source_name.clone(),
                is_trusted: s.is_trusted,
            }),
            result_count: sources.len(),
            searches_used,
            second_pass_used,
            second_query,
            trusted_steer_used,
            error: None,
        }
    }

    /// One search, with provider errors degraded to an empty result
    async fn search_tolerant(
        &self,
        search_query: &str,
        ctx: &ValidationContext,
        searches_used: &mut u32,
    ) -> Vec<EvidenceSource> {
        *searches_used += 1;
        match self
            .retriever
            .search(search_query, &ctx.trust, &ctx.metrics)
            .await
        {
            Ok(sources) => sources,
            Err(e) => {
                warn!(
                    query = %truncate_chars(search_query, 60),
                    error = %e,
                    "search failed, continuing without evidence"
                );
                Vec::new()
            }
        }
    }

    /// Ask the model whether the evidence supports the hypothesis.
    ///
    /// Absence of a clear answer is "not validated", never an error.
    pub async fn judge(
        &self,
        hypothesis: &Hypothesis,
        sources: &[EvidenceSource],
        ctx: &ValidationContext,
    ) -> ValidationResult {
        let evidence_text = sources
            .iter()
            .take(JUDGE_SOURCES)
            .map(|s| {
                let window = if s.synthesized {
                    ANALYSIS_CHARS
                } else {
                    SNIPPET_CHARS
                };
                let content = if s.raw_content.is_empty() {
                    &s.content
                } else {
                    &s.raw_content
                };
                format!("Title: {}\nContent: {}", s.title, truncate_chars(content, window))
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = format!(
            "Hypothesis: {}\n\nSearch Results:\n{evidence_text}\n\n\
             Do these search results contain direct evidence supporting the hypothesis?\n\
             Report only facts explicitly present in the sources - no inference, no speculation.\n\
             Return JSON: {{\"validated\": true/false, \"evidence\": \
             \"SHORT factual summary (20 words max) with key numbers/dates\"}}",
            hypothesis.hypothesis
        );

        match self
            .gateway
            .generate(&prompt, ctx.provider, 500, None, &ctx.metrics)
            .await
        {
            Ok(content) => {
                let map = crate::llm::json::extract_json(&content);
                ValidationResult {
                    validated: map
                        .get("validated")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false),
                    evidence: map
                        .get("evidence")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                }
            }
            Err(e) => {
                warn!(error = %e, "judge call failed, treating as not validated");
                ValidationResult::not_validated()
            }
        }
    }
}
