//! Anthropic Messages API backend.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{Generation, LlmBackend, LlmError, Provider};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Text generation via the Anthropic Messages API
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl AnthropicBackend {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }

    /// Build from `ANTHROPIC_API_KEY`; `None` when the key is absent
    pub fn from_env(model: String) -> Option<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").ok()?;
        Some(Self::new(api_key, model))
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    fn provider(&self) -> Provider {
        Provider::Anthropic
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
        let mut body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(system) = system_prompt {
            body["system"] = json!(system);
        }

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), detail));
        }

        let parsed: MessagesResponse = response.json().await?;
        let text = parsed
            .content
            .first()
            .map(|block| block.text.clone())
            .unwrap_or_default();

        Ok(Generation {
            text,
            model: self.model.clone(),
            tokens_in: parsed.usage.input_tokens,
            tokens_out: parsed.usage.output_tokens,
        })
    }
}

fn classify_error(status: u16, detail: String) -> LlmError {
    if status == 429 {
        return LlmError::RateLimited {
            provider: Provider::Anthropic,
        };
    }
    // Exhausted credits come back as a 400 with a billing message
    if detail.contains("credit balance is too low") || detail.contains("purchase credits") {
        return LlmError::QuotaExhausted {
            provider: Provider::Anthropic,
            detail,
        };
    }
    LlmError::Api {
        provider: Provider::Anthropic,
        status,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_error_classified() {
        let err = classify_error(400, "Your credit balance is too low".to_string());
        assert!(matches!(err, LlmError::QuotaExhausted { .. }));
    }

    #[test]
    fn test_rate_limit_classified() {
        let err = classify_error(429, String::new());
        assert!(matches!(err, LlmError::RateLimited { .. }));
    }

    #[test]
    fn test_other_errors_are_api() {
        let err = classify_error(500, "server error".to_string());
        assert!(matches!(err, LlmError::Api { status: 500, .. }));
    }
}
