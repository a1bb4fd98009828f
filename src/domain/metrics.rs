//! Run-scoped telemetry.
//!
//! Metrics live in an explicit `Arc<RunMetrics>` handle threaded through
//! every call that does external I/O, including worker closures. Nothing
//! here is ambient or task-local: losing attribution across a worker pool
//! silently corrupts telemetry.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One LLM call as recorded by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallRecord {
    pub provider: String,
    pub model: String,
    pub latency_ms: u64,
    pub max_tokens: u32,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub prompt_chars: usize,
    pub output_chars: usize,
}

/// Mutable counters for one pipeline run.
///
/// Created at run start, incremented throughout, finalized exactly once
/// into a [`RunSummary`].
#[derive(Debug)]
pub struct RunMetrics {
    pub run_id: Uuid,
    pub provider: String,
    pub question: String,
    pub started_at: DateTime<Utc>,
    started: Instant,

    web_searches: AtomicU64,
    web_search_retries: AtomicU64,
    llm_calls: AtomicU64,
    tokens_in: AtomicU64,
    tokens_out: AtomicU64,

    llm_call_details: Mutex<Vec<LlmCallRecord>>,
}

impl RunMetrics {
    pub fn start(run_id: Uuid, provider: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            run_id,
            provider: provider.into(),
            question: question.into(),
            started_at: Utc::now(),
            started: Instant::now(),
            web_searches: AtomicU64::new(0),
            web_search_retries: AtomicU64::new(0),
            llm_calls: AtomicU64::new(0),
            tokens_in: AtomicU64::new(0),
            tokens_out: AtomicU64::new(0),
            llm_call_details: Mutex::new(Vec::new()),
        }
    }

    /// Record one web-search backend call
    pub fn record_search(&self) {
        self.web_searches.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one escalation pass (broad retry or trusted-source steering)
    pub fn record_escalation(&self) {
        self.web_search_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one LLM call with its usage
    pub fn record_llm(&self, record: LlmCallRecord) {
        self.llm_calls.fetch_add(1, Ordering::Relaxed);
        self.tokens_in.fetch_add(record.tokens_in, Ordering::Relaxed);
        self.tokens_out.fetch_add(record.tokens_out, Ordering::Relaxed);
        if let Ok(mut details) = self.llm_call_details.lock() {
            details.push(record);
        }
    }

    pub fn web_searches(&self) -> u64 {
        self.web_searches.load(Ordering::Relaxed)
    }

    pub fn web_search_retries(&self) -> u64 {
        self.web_search_retries.load(Ordering::Relaxed)
    }

    pub fn llm_calls(&self) -> u64 {
        self.llm_calls.load(Ordering::Relaxed)
    }

    pub fn tokens_in(&self) -> u64 {
        self.tokens_in.load(Ordering::Relaxed)
    }

    pub fn tokens_out(&self) -> u64 {
        self.tokens_out.load(Ordering::Relaxed)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Snapshot into a durable summary record
    pub fn finalize(&self, brand: Option<&str>, time_period: Option<&str>) -> RunSummary {
        let tokens_in = self.tokens_in();
        let tokens_out = self.tokens_out();
        RunSummary {
            run_id: self.run_id,
            started_at: self.started_at,
            latency_ms: self.elapsed_ms(),
            provider: self.provider.clone(),
            question: self.question.clone(),
            brand: brand.map(str::to_string),
            time_period: time_period.map(str::to_string),
            web_searches: self.web_searches(),
            web_search_retries: self.web_search_retries(),
            llm_calls: self.llm_calls(),
            tokens_in,
            tokens_out,
            tokens_total: tokens_in + tokens_out,
            validated_counts: None,
            help: false,
            coached: false,
            error: None,
        }
    }
}

/// Finalized per-run record, emitted once per run on every path
/// (pipeline, help, coaching, failure).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub latency_ms: u64,
    pub provider: String,
    pub question: String,
    pub brand: Option<String>,
    pub time_period: Option<String>,
    pub web_searches: u64,
    pub web_search_retries: u64,
    pub llm_calls: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub tokens_total: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated_counts: Option<serde_json::Map<String, serde_json::Value>>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub help: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub coached: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Bounded in-process ring buffer of recent run summaries
#[derive(Debug)]
pub struct RunLog {
    inner: Mutex<VecDeque<RunSummary>>,
    capacity: usize,
}

impl Default for RunLog {
    fn default() -> Self {
        Self::new(500)
    }
}

impl RunLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
        }
    }

    pub fn push(&self, summary: RunSummary) {
        if let Ok(mut log) = self.inner.lock() {
            if log.len() == self.capacity {
                log.pop_front();
            }
            log.push_back(summary);
        }
    }

    /// Most recent summaries, newest last
    pub fn recent(&self, limit: usize) -> Vec<RunSummary> {
        match self.inner.lock() {
            Ok(log) => log.iter().rev().take(limit).rev().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = RunMetrics::start(Uuid::new_v4(), "anthropic", "q");
        metrics.record_search();
        metrics.record_search();
        metrics.record_escalation();
        metrics.record_llm(LlmCallRecord {
            provider: "anthropic".into(),
            model: "m".into(),
            latency_ms: 10,
            max_tokens: 500,
            tokens_in: 100,
            tokens_out: 40,
            prompt_chars: 300,
            output_chars: 80,
        });

        assert_eq!(metrics.web_searches(), 2);
        assert_eq!(metrics.web_search_retries(), 1);
        assert_eq!(metrics.llm_calls(), 1);

        let summary = metrics.finalize(Some("new look"), Some("Q3 2025"));
        assert_eq!(summary.tokens_total, 140);
        assert_eq!(summary.brand.as_deref(), Some("new look"));
    }

    #[test]
    fn test_run_log_evicts_oldest() {
        let log = RunLog::new(2);
        for i in 0..3u64 {
            let metrics = RunMetrics::start(Uuid::new_v4(), "openai", format!("q{i}"));
            log.push(metrics.finalize(None, None));
        }
        let recent = log.recent(10);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].question, "q1");
        assert_eq!(recent[1].question, "q2");
    }
}
