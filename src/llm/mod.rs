//! LLM gateway: a uniform text-generation interface over interchangeable
//! model providers.
//!
//! Backends implement [`LlmBackend`]; the [`LlmGateway`] routes by
//! [`Provider`], passes the system prompt through only when given, and
//! records per-call usage into the active run's metrics. It never
//! substitutes a different provider than the one requested.

pub mod anthropic;
pub mod json;
pub mod openai;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{LlmCallRecord, RunMetrics};

pub use anthropic::AnthropicBackend;
pub use openai::OpenAiBackend;

/// Closed set of supported providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Anthropic,
    OpenAi,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(LlmError::UnknownProvider {
                name: other.to_string(),
            }),
        }
    }
}

/// Output of one generation call
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Errors from the gateway and its backends
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Unknown provider: {name}. Use 'anthropic' or 'openai'.")]
    UnknownProvider { name: String },

    #[error("{provider} backend not configured: set {env_var}")]
    Unconfigured {
        provider: Provider,
        env_var: &'static str,
    },

    #[error("API credits exhausted for {provider}: {detail}")]
    QuotaExhausted { provider: Provider, detail: String },

    #[error("rate limited by {provider}")]
    RateLimited { provider: Provider },

    #[error("{provider} API error ({status}): {detail}")]
    Api {
        provider: Provider,
        status: u16,
        detail: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// A single text-generation backend
#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn provider(&self) -> Provider;

    /// Model identifier used for telemetry
    fn model(&self) -> &str;

    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        system_prompt: Option<&str>,
    ) -> Result<Generation, LlmError>;
}

/// Routes generation calls to the backend for the requested provider
#[derive(Clone, Default)]
pub struct LlmGateway {
    backends: HashMap<Provider, Arc<dyn LlmBackend>>,
}

impl LlmGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend, replacing any previous one for its provider
    pub fn with_backend(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.backends.insert(backend.provider(), backend);
        self
    }

    pub fn has_backend(&self, provider: Provider) -> bool {
        self.backends.contains_key(&provider)
    }

    /// Generate text via the requested provider and record the call into
    /// the run's metrics.
    pub async fn generate(
        &self,
        prompt: &str,
        provider: Provider,
        max_tokens: u32,
        system_prompt: Option<&str>,
        metrics: &RunMetrics,
    ) -> Result<String, LlmError> {
        let backend = self.backends.get(&provider).ok_or(LlmError::Unconfigured {
            provider,
            env_var: match provider {
                Provider::Anthropic => "ANTHROPIC_API_KEY",
                Provider::OpenAi => "OPENAI_API_KEY",
            },
        })?;

        let started = Instant::now();
        let generation = backend.generate(prompt, max_tokens, system_prompt).await?;

        metrics.record_llm(LlmCallRecord {
            provider: provider.to_string(),
            model: generation.model.clone(),
            latency_ms: started.elapsed().as_millis() as u64,
            max_tokens,
            tokens_in: generation.tokens_in,
            tokens_out: generation.tokens_out,
            prompt_chars: prompt.len(),
            output_chars: generation.text.len(),
        });

        Ok(generation.text)
    }
}
