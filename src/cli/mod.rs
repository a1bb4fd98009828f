//! Command-line interface for researcher.
//!
//! Provides commands for asking research questions (batch or streamed),
//! inspecting the trusted-source registry, and listing recent runs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::core::{score_report, Researcher};
use crate::domain::{Category, PipelineEvent, ResearchReport, ResearchRequest};
use crate::search::trust::TrustRegistry;

/// researcher - Hypothesis-driven brand metric research pipeline
#[derive(Parser, Debug)]
#[command(name = "researcher")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask why a brand metric changed
    Ask {
        /// The research question
        question: String,

        /// LLM provider ("anthropic" or "openai")
        #[arg(short, long)]
        provider: Option<String>,

        /// Hypotheses per category, clamped to [1, 10]
        #[arg(long)]
        max_hypotheses: Option<usize>,

        /// System prompt prepended to generation calls
        #[arg(long)]
        system_prompt: Option<String>,

        /// Print lifecycle events as they arrive
        #[arg(long)]
        stream: bool,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,

        /// Eval mode: fewer hypotheses, no escalation passes, plus a
        /// heuristic report score
        #[arg(long)]
        eval: bool,
    },

    /// Print the trusted-source registry
    Sources,

    /// List recent run summaries from this process
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Ask {
                question,
                provider,
                max_hypotheses,
                system_prompt,
                stream,
                json,
                eval,
            } => {
                let request = ResearchRequest {
                    question,
                    provider,
                    system_prompt,
                    max_hypotheses_per_category: max_hypotheses,
                    trusted_sources: None,
                    eval_mode: eval,
                };
                ask(request, stream, json, eval).await
            }
            Commands::Sources => show_sources(),
            Commands::Runs { limit } => show_runs(limit),
        }
    }
}

async fn ask(request: ResearchRequest, stream: bool, json: bool, eval: bool) -> Result<()> {
    let researcher = Researcher::from_env().context("Failed to build research pipeline")?;

    let report = if stream {
        let mut rx = researcher.run_streamed(request);
        let mut last: Option<ResearchReport> = None;

        while let Some(event) = rx.recv().await {
            if json {
                println!("{}", serde_json::to_string(&event)?);
            } else {
                print_event(&event);
            }
            if let PipelineEvent::Final { report } = event {
                last = Some(*report);
            }
        }

        last.context("run ended without a final report")?
    } else {
        researcher.run(request).await?
    };

    if json {
        if !stream {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    } else {
        print_report(&report);
    }

    if eval {
        let score = score_report(&report);
        println!(
            "\nEval score: {}/100 ({} drivers, {} citations, {} domains)",
            score.score, score.drivers_total, score.citations_total, score.unique_domains
        );
    }

    Ok(())
}

fn print_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::Started { run_id, provider } => {
            println!("run {run_id} started (provider: {provider})");
        }
        PipelineEvent::Parsed {
            brand,
            metric,
            direction,
            time_period,
        } => {
            println!(
                "parsed: {brand} / {metric} / {} / {}",
                direction.as_str(),
                time_period.as_deref().unwrap_or("any period")
            );
        }
        PipelineEvent::Competitors { competitors } => {
            println!("competitors: {}", competitors.join(", "));
        }
        PipelineEvent::Hypotheses { hypotheses } => {
            println!("generated {} hypotheses", hypotheses.total());
        }
        PipelineEvent::HypothesisResult {
            outcome,
            completed,
            total,
        } => {
            let status = if outcome.validated { "validated" } else { "not validated" };
            println!(
                "[{completed}/{total}] {} ({}): {status}",
                outcome.hypothesis,
                outcome.category.key()
            );
        }
        PipelineEvent::QualityFilter { notice } => {
            println!(
                "quality gate dropped {} finding(s) ({:.0}% -> {:.0}% trusted)",
                notice.dropped.len(),
                notice.ratio_before_pct,
                notice.ratio_after_pct
            );
        }
        PipelineEvent::ExecutiveSummary { text } => {
            println!("\n{text}\n");
        }
        PipelineEvent::Final { .. } => {}
    }
}

fn print_report(report: &ResearchReport) {
    println!("\nQuestion: {}", report.question);
    println!(
        "Brand: {} | Metric: {} | Direction: {} | Period: {}",
        report.brand,
        report.metrics.join(", "),
        report.direction.as_str(),
        report.time_period.as_deref().unwrap_or("-")
    );

    if let Some(coaching) = &report.coaching {
        println!("\n{}", coaching.message);
        for example in &coaching.examples {
            println!("  e.g. {example}");
        }
        for suggestion in &coaching.suggested_questions {
            println!("  try: {suggestion}");
        }
        return;
    }

    for category in Category::ALL {
        let drivers = report.summary.get(category);
        println!("\n{} ({})", category.driver_key(), drivers.len());
        for entry in drivers {
            println!("  - {}", entry.driver);
            for url in &entry.source_urls {
                println!("    {url}");
            }
        }
    }

    if let Some(text) = &report.executive_summary {
        println!("\n{text}");
    }

    println!(
        "\n{} validated, {:.0}% trusted | {} searches ({} escalations), {} LLM calls, \
         {} tokens, {}ms",
        report.validated_hypotheses.total(),
        report.trusted_ratio_pct,
        report.web_searches,
        report.web_search_retries,
        report.llm_calls,
        report.tokens_total,
        report.latency_ms
    );
}

fn show_sources() -> Result<()> {
    let registry = TrustRegistry::default();
    let snapshot = registry.snapshot();

    println!("{:<28} {:<26} {:>5}  tier", "domain", "name", "score");
    for entry in snapshot.iter() {
        println!(
            "{:<28} {:<26} {:>5}  {:?}",
            entry.domain, entry.name, entry.trust_score, entry.tier
        );
    }

    Ok(())
}

fn show_runs(limit: usize) -> Result<()> {
    // The run log is an in-process ring buffer; a fresh CLI process has
    // nothing to show until it has served runs itself.
    let researcher = Researcher::from_env().context("Failed to build research pipeline")?;
    let summaries = researcher.run_log().recent(limit);

    if summaries.is_empty() {
        println!("No runs recorded in this process.");
        return Ok(());
    }

    for summary in summaries {
        println!(
            "{} {} {}ms searches={} llm={} tokens={} {}",
            summary.started_at.format("%Y-%m-%d %H:%M:%S"),
            summary.run_id,
            summary.latency_ms,
            summary.web_searches,
            summary.llm_calls,
            summary.tokens_total,
            summary.error.as_deref().unwrap_or("ok")
        );
    }

    Ok(())
}
