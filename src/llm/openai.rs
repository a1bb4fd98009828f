//! OpenAI Chat Completions backend.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{Generation, LlmBackend, LlmError, Provider};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Text generation via the OpenAI Chat Completions API
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl OpenAiBackend {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model,
        }
    }

    /// Build from `OPENAI_API_KEY` (and `OPENAI_BASE_URL` when set);
    /// `None` when the key is absent
    pub fn from_env(model: String) -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").ok()?;
        let base_url = std::env::var("OPENAI_BASE_URL").ok();
        Some(Self::new(api_key, model, base_url))
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        system_prompt: Option<&str>,
    ) -> Result<Generation, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": messages,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), detail));
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(Generation {
            text,
            model: self.model.clone(),
            tokens_in: parsed.usage.prompt_tokens,
            tokens_out: parsed.usage.completion_tokens,
        })
    }
}

fn classify_error(status: u16, detail: String) -> LlmError {
    if status == 429 && !detail.contains("insufficient_quota") {
        return LlmError::RateLimited {
            provider: Provider::OpenAi,
        };
    }
    if detail.contains("insufficient_quota") || detail.contains("billing") {
        return LlmError::QuotaExhausted {
            provider: Provider::OpenAi,
            detail,
        };
    }
    LlmError::Api {
        provider: Provider::OpenAi,
        status,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_quota_is_quota_error() {
        // OpenAI reports exhausted quota as a 429 with this error code
        let err = classify_error(429, r#"{"error":{"code":"insufficient_quota"}}"#.to_string());
        assert!(matches!(err, LlmError::QuotaExhausted { .. }));
    }

    #[test]
    fn test_plain_429_is_rate_limit() {
        let err = classify_error(429, "Too Many Requests".to_string());
        assert!(matches!(err, LlmError::RateLimited { .. }));
    }
}
