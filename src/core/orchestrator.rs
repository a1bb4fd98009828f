//! Pipeline orchestration.
//!
//! [`Researcher`] wires the classifier, generator, validator, quality gate,
//! and summary builder into one run. Every run produces a structurally
//! complete report and exactly one run summary, on every path: pipeline,
//! help, coaching, or failure.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config;
use crate::domain::{
    Coaching, ParsedIntent, PipelineEvent, ResearchReport, ResearchRequest, RunLog, RunMetrics,
    RunSummary, TrustedDomain, ValidatedSet,
};
use crate::llm::{AnthropicBackend, LlmGateway, OpenAiBackend, Provider};
use crate::search::trust::TrustRegistry;
use crate::search::{EvidenceRetriever, OpenAiWebSearch};

use super::classifier::{self, Route};
use super::generator::{parse_intent, GeneratorOptions, HypothesisGenerator};
use super::quality::QualityGate;
use super::summary::build_summary;
use super::validator::{HypothesisValidator, ValidationContext};

/// Buffered events per streamed run
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Tunables for the orchestrator, resolved from configuration
#[derive(Debug, Clone)]
pub struct ResearcherSettings {
    /// Provider used when the request names none
    pub default_provider: String,

    /// Concurrent hypothesis workers; 1 processes sequentially
    pub workers: usize,

    /// Minimum percentage of trusted-source-backed findings
    pub min_verified_pct: f64,
}

impl Default for ResearcherSettings {
    fn default() -> Self {
        Self {
            default_provider: "openai".to_string(),
            workers: 5,
            min_verified_pct: 25.0,
        }
    }
}

/// The research pipeline: question in, validated-findings report out
#[derive(Clone)]
pub struct Researcher {
    gateway: Arc<LlmGateway>,
    generator: HypothesisGenerator,
    validator: HypothesisValidator,
    registry: TrustRegistry,
    run_log: Arc<RunLog>,
    settings: ResearcherSettings,
}

impl Researcher {
    pub fn new(
        gateway: Arc<LlmGateway>,
        retriever: Arc<EvidenceRetriever>,
        settings: ResearcherSettings,
    ) -> Self {
        Self {
            generator: HypothesisGenerator::new(Arc::clone(&gateway)),
            validator: HypothesisValidator::new(Arc::clone(&gateway), retriever),
            gateway,
            registry: TrustRegistry::default(),
            run_log: Arc::new(RunLog::default()),
            settings,
        }
    }

    /// Build a production pipeline from configuration and environment keys.
    ///
    /// LLM backends are registered per available key; the web-search
    /// capability is required, so a missing `OPENAI_API_KEY` is a hard
    /// failure here rather than a degraded run later.
    pub fn from_env() -> Result<Self> {
        let settings = config::settings()?;

        let mut gateway = LlmGateway::new();
        if let Some(backend) = AnthropicBackend::from_env(settings.models.anthropic.clone()) {
            gateway = gateway.with_backend(Arc::new(backend));
        }
        if let Some(backend) = OpenAiBackend::from_env(settings.models.openai.clone()) {
            gateway = gateway.with_backend(Arc::new(backend));
        }

        let search = OpenAiWebSearch::from_env(settings.models.search.clone())
            .context("web search needs OPENAI_API_KEY")?;
        let retriever = Arc::new(EvidenceRetriever::new(
            Arc::new(search),
            settings.pipeline.max_sources,
        ));

        Ok(Self::new(
            Arc::new(gateway),
            retriever,
            ResearcherSettings {
                default_provider: settings.provider.clone(),
                workers: settings.pipeline.workers,
                min_verified_pct: settings.pipeline.min_verified_pct,
            },
        ))
    }

    /// The process-wide trusted-source registry
    pub fn registry(&self) -> &TrustRegistry {
        &self.registry
    }

    /// Recent run summaries
    pub fn run_log(&self) -> &RunLog {
        &self.run_log
    }

    /// Run the pipeline to completion and return the report.
    #[instrument(skip(self, request), fields(question = %request.question))]
    pub async fn run(&self, request: ResearchRequest) -> Result<ResearchReport> {
        self.run_inner(&request, None).await
    }

    /// Run the pipeline, emitting lifecycle events as they happen.
    ///
    /// Events arrive in order: started, parsed, competitors (when any were
    /// found), hypotheses, one hypothesis_result per completion, quality
    /// filter (only when findings were dropped), executive summary (when
    /// synthesis succeeds), final. Dropping the receiver abandons the
    /// stream without corrupting shared state.
    pub fn run_streamed(&self, request: ResearchRequest) -> mpsc::Receiver<PipelineEvent> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let researcher = self.clone();

        tokio::spawn(async move {
            match researcher.run_inner(&request, Some(tx.clone())).await {
                Ok(report) => {
                    let _ = tx
                        .send(PipelineEvent::Final {
                            report: Box::new(report),
                        })
                        .await;
                }
                Err(e) => {
                    error!(error = %e, "streamed run failed");
                }
            }
        });

        rx
    }

    async fn run_inner(
        &self,
        request: &ResearchRequest,
        events: Option<mpsc::Sender<PipelineEvent>>,
    ) -> Result<ResearchReport> {
        let provider: Provider = request
            .provider
            .as_deref()
            .unwrap_or(&self.settings.default_provider)
            .parse()?;

        let run_id = Uuid::new_v4();
        let metrics = Arc::new(RunMetrics::start(
            run_id,
            provider.as_str(),
            &request.question,
        ));
        info!(%run_id, provider = %provider, "research run started");

        if let Some(tx) = &events {
            let _ = tx
                .send(PipelineEvent::Started {
                    run_id,
                    provider: provider.to_string(),
                })
                .await;
        }

        // Cheap local gate: help and out-of-scope questions never reach
        // the generator or the search budget.
        match classifier::classify(&request.question) {
            Route::Help(coaching) => {
                return Ok(self.short_circuit(request, provider, &metrics, coaching, None));
            }
            Route::Coaching {
                coaching,
                brand_guess,
            } => {
                return Ok(self.short_circuit(
                    request,
                    provider,
                    &metrics,
                    coaching,
                    Some(brand_guess),
                ));
            }
            Route::Pipeline => {}
        }

        let result = self
            .pipeline(request, provider, Arc::clone(&metrics), run_id, events)
            .await;

        let summary = match &result {
            Ok(report) => {
                let mut summary = metrics.finalize(
                    Some(&report.brand),
                    report.time_period.as_deref(),
                );
                summary.validated_counts = Some(report.validated_hypotheses.counts());
                summary
            }
            Err(e) => {
                let mut summary = metrics.finalize(None, None);
                summary.error = Some(e.to_string());
                summary
            }
        };
        self.record_run(summary);

        result
    }

    /// The full in-scope pipeline: intent, competitors, generation,
    /// validation, quality gate, summary.
    async fn pipeline(
        &self,
        request: &ResearchRequest,
        provider: Provider,
        metrics: Arc<RunMetrics>,
        run_id: Uuid,
        events: Option<mpsc::Sender<PipelineEvent>>,
    ) -> Result<ResearchReport> {
        let trust: Arc<Vec<TrustedDomain>> = match &request.trusted_sources {
            // Per-request override stays run-local; the shared registry is
            // never touched.
            Some(sources) => Arc::new(sources.clone()),
            None => self.registry.snapshot(),
        };

        let mut intent = parse_intent(&self.gateway, &request.question, provider, &metrics).await?;
        if intent.brand != "unknown" {
            intent.industry = self
                .generator
                .resolve_industry(&intent.brand, provider, &metrics)
                .await;
        }
        info!(
            brand = %intent.brand,
            metric = %intent.metric,
            direction = intent.direction.as_str(),
            "intent parsed"
        );

        if let Some(tx) = &events {
            let _ = tx
                .send(PipelineEvent::Parsed {
                    brand: intent.brand.clone(),
                    metric: intent.metric.clone(),
                    direction: intent.direction,
                    time_period: intent.time_period.clone(),
                })
                .await;
        }

        let mut competitors = HypothesisGenerator::known_competitors(&intent.brand);
        if competitors.is_empty() {
            competitors = self
                .generator
                .discover_competitors(&intent, provider, &metrics)
                .await;
        }
        if !competitors.is_empty() {
            if let Some(tx) = &events {
                let _ = tx
                    .send(PipelineEvent::Competitors {
                        competitors: competitors.clone(),
                    })
                    .await;
            }
        }

        let options = GeneratorOptions {
            provider,
            cap: request.hypothesis_cap(),
            system_prompt: request.system_prompt.clone(),
        };
        let mut hypotheses = self
            .generator
            .generate(&intent, &competitors, &options, &metrics)
            .await?;
        self.generator
            .filter_relevant(&mut hypotheses, &intent, provider, &metrics)
            .await;

        if let Some(tx) = &events {
            let _ = tx
                .send(PipelineEvent::Hypotheses {
                    hypotheses: hypotheses.clone(),
                })
                .await;
        }

        let ctx = ValidationContext {
            intent: intent.clone(),
            provider,
            trust,
            metrics: Arc::clone(&metrics),
            workers: self.settings.workers,
            eval_mode: request.eval_mode,
            events: events.clone(),
        };
        let (mut validated, _outcomes) = self.validator.validate_all(&hypotheses, &ctx).await;

        let gate = QualityGate::new(self.settings.min_verified_pct);
        let quality_filter = gate.apply(&mut validated);
        if let Some(notice) = &quality_filter {
            if let Some(tx) = &events {
                let _ = tx
                    .send(PipelineEvent::QualityFilter {
                        notice: notice.clone(),
                    })
                    .await;
            }
        }

        let summary = build_summary(&validated);

        // Narrative synthesis is a streaming-path extra; its failure only
        // skips the event.
        let executive_summary = if events.is_some() {
            let narrative = self
                .executive_summary(&intent, &validated, provider, &metrics)
                .await;
            if let (Some(text), Some(tx)) = (&narrative, &events) {
                let _ = tx
                    .send(PipelineEvent::ExecutiveSummary { text: text.clone() })
                    .await;
            }
            narrative
        } else {
            None
        };

        let trusted_ratio_pct = QualityGate::trusted_ratio_pct(&validated);
        info!(
            validated = validated.total(),
            trusted_ratio_pct,
            searches = metrics.web_searches(),
            "research run complete"
        );

        Ok(ResearchReport {
            question: request.question.clone(),
            brand: intent.brand.clone(),
            metrics: vec![intent.metric.clone()],
            direction: intent.direction,
            time_period: intent.time_period.clone(),
            provider_used: provider.to_string(),
            hypotheses,
            validated_hypotheses: validated,
            summary,
            coaching: None,
            quality_filter,
            executive_summary,
            trusted_ratio_pct,
            run_id,
            latency_ms: metrics.elapsed_ms(),
            web_searches: metrics.web_searches(),
            web_search_retries: metrics.web_search_retries(),
            llm_calls: metrics.llm_calls(),
            tokens_in: metrics.tokens_in(),
            tokens_out: metrics.tokens_out(),
            tokens_total: metrics.tokens_in() + metrics.tokens_out(),
        })
    }

    /// Structurally complete report for help and coaching responses: all
    /// categories present and empty, zero search/LLM work recorded.
    fn short_circuit(
        &self,
        request: &ResearchRequest,
        provider: Provider,
        metrics: &RunMetrics,
        coaching: Coaching,
        brand_guess: Option<String>,
    ) -> ResearchReport {
        let coached = coaching.kind == "coaching";
        let intent = ParsedIntent::fallback();
        let brand = brand_guess.unwrap_or_else(|| intent.brand.clone());
        info!(kind = %coaching.kind, "question short-circuited");

        let mut summary = metrics.finalize(Some(&brand), None);
        summary.help = !coached;
        summary.coached = coached;
        self.record_run(summary);

        ResearchReport {
            question: request.question.clone(),
            brand,
            metrics: vec![intent.metric],
            direction: intent.direction,
            time_period: None,
            provider_used: provider.to_string(),
            hypotheses: Default::default(),
            validated_hypotheses: ValidatedSet::default(),
            summary: Default::default(),
            coaching: Some(coaching),
            quality_filter: None,
            executive_summary: None,
            trusted_ratio_pct: 0.0,
            run_id: metrics.run_id,
            latency_ms: metrics.elapsed_ms(),
            web_searches: metrics.web_searches(),
            web_search_retries: metrics.web_search_retries(),
            llm_calls: metrics.llm_calls(),
            tokens_in: metrics.tokens_in(),
            tokens_out: metrics.tokens_out(),
            tokens_total: metrics.tokens_in() + metrics.tokens_out(),
        }
    }

    /// One short narrative over the validated findings; `None` when there
    /// is nothing to synthesize or the call fails.
    async fn executive_summary(
        &self,
        intent: &ParsedIntent,
        validated: &ValidatedSet,
        provider: Provider,
        metrics: &RunMetrics,
    ) -> Option<String> {
        if validated.total() == 0 {
            return None;
        }

        let findings = crate::domain::Category::ALL
            .iter()
            .flat_map(|c| validated.get(*c))
            .map(|f| format!("- {} ({})", f.evidence, f.source))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Write a 3-4 sentence executive summary explaining the {direction} in \
             {metric} for \"{brand}\"{period}, using ONLY these validated findings:\n\
             {findings}\n\nPlain prose, no preamble, no bullet points.",
            direction = intent.direction.as_str(),
            metric = intent.metric,
            brand = intent.brand,
            period = intent
                .time_period
                .as_deref()
                .map(|p| format!(" in {p}"))
                .unwrap_or_default(),
        );

        match self
            .gateway
            .generate(&prompt, provider, 400, None, metrics)
            .await
        {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "executive summary failed, skipping");
                None
            }
        }
    }

    fn record_run(&self, summary: RunSummary) {
        info!(
            run_id = %summary.run_id,
            latency_ms = summary.latency_ms,
            web_searches = summary.web_searches,
            llm_calls = summary.llm_calls,
            tokens = summary.tokens_total,
            help = summary.help,
            coached = summary.coached,
            error = summary.error.as_deref().unwrap_or(""),
            "run summary"
        );
        self.run_log.push(summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::llm::{Generation, LlmBackend, LlmError};
    use crate::search::{RawSearch, SearchBackend, SearchError};

    struct NeverCalledLlm;

    #[async_trait]
    impl LlmBackend for NeverCalledLlm {
        fn provider(&self) -> Provider {
            Provider::OpenAi
        }

        fn model(&self) -> &str {
            "never"
        }

        async fn generate(
            &self,
            _prompt: &str,
            _max_tokens: u32,
            _system: Option<&str>,
        ) -> Result<Generation, LlmError> {
            panic!("short-circuited question must not reach the LLM");
        }
    }

    struct NeverCalledSearch;

    #[async_trait]
    impl SearchBackend for NeverCalledSearch {
        async fn search(&self, _q: &str) -> Result<RawSearch, SearchError> {
            panic!("short-circuited question must not reach search");
        }
    }

    fn quiet_researcher() -> Researcher {
        let gateway = Arc::new(LlmGateway::new().with_backend(Arc::new(NeverCalledLlm)));
        let retriever = Arc::new(EvidenceRetriever::new(Arc::new(NeverCalledSearch), 6));
        Researcher::new(gateway, retriever, ResearcherSettings::default())
    }

    #[tokio::test]
    async fn test_help_short_circuits_without_calls() {
        let researcher = quiet_researcher();
        let report = researcher
            .run(ResearchRequest::new("help"))
            .await
            .unwrap();

        assert_eq!(report.coaching.as_ref().unwrap().kind, "help");
        assert_eq!(report.metrics, vec!["salient"]);
        assert_eq!(report.hypotheses.total(), 0);
        assert_eq!(report.web_searches, 0);
        assert_eq!(report.llm_calls, 0);

        let summaries = researcher.run_log().recent(10);
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].help);
    }

    #[tokio::test]
    async fn test_out_of_scope_coaches_without_calls() {
        let researcher = quiet_researcher();
        let report = researcher
            .run(ResearchRequest::new("What is New Look's market cap?"))
            .await
            .unwrap();

        let coaching = report.coaching.unwrap();
        assert_eq!(coaching.kind, "coaching");
        assert!(coaching.need.contains(&"timeframe".to_string()));
        assert_eq!(report.llm_calls, 0);
        assert!(researcher.run_log().recent(1)[0].coached);
    }

    #[tokio::test]
    async fn test_unknown_provider_fails_fast() {
        let researcher = quiet_researcher();
        let mut request = ResearchRequest::new("help");
        request.provider = Some("mistral".to_string());

        let err = researcher.run(request).await.unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
    }
}
