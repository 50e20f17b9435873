// src/provider/openai_compat.rs — OpenAI-compatible chat completions adapter
//
// Works against OpenAI itself and any server exposing `/chat/completions`
// (vLLM, Ollama's OpenAI shim, OpenRouter, Groq, ...).

use async_trait::async_trait;
use std::time::Duration;

use super::{ChatRequest, ChatResponse, ModelProvider, Role};
use crate::infra::config::ProviderConfig;
use crate::infra::errors::ArcherError;

pub struct OpenAICompatProvider {
    id_str: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAICompatProvider {
    pub fn new(
        id: impl Into<String>,
        api_key: String,
        base_url: String,
        request_timeout: Duration,
    ) -> Result<Self, ArcherError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(format!("archer/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ArcherError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            id_str: id.into(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Build from config, reading the API key from the configured env var.
    /// Local servers often need no key, so a missing variable is not an error.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ArcherError> {
        let api_key = std::env::var(&config.api_key_env).unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!(
                env = %config.api_key_env,
                "No API key set; requests go out unauthenticated"
            );
        }
        Self::new(
            config.id.clone(),
            api_key,
            config.base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn request_body(request: &ChatRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": match m.role {
                        Role::System => "system",
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        body
    }
}

/// Retry-After header in milliseconds, if present and numeric.
fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs * 1000)
        .unwrap_or(0)
}

#[async_trait]
impl ModelProvider for OpenAICompatProvider {
    fn id(&self) -> &str {
        &self.id_str
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ArcherError> {
        let body = Self::request_body(&request);

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let response = builder.send().await.map_err(|e| ArcherError::Provider {
            provider: self.id_str.clone(),
            message: e.to_string(),
            retriable: e.is_timeout() || e.is_connect(),
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ArcherError::RateLimited {
                provider: self.id_str.clone(),
                retry_after_ms: retry_after_ms(response.headers()),
            });
        }
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ArcherError::Provider {
                provider: self.id_str.clone(),
                message: format!("HTTP {status}: {error_body}"),
                retriable: status.is_server_error(),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| ArcherError::Provider {
            provider: self.id_str.clone(),
            message: format!("Malformed completion body: {e}"),
            retriable: false,
        })?;

        tracing::debug!(
            provider = %self.id_str,
            model = %request.model,
            choices = parsed.choices.len(),
            tokens = parsed.usage.total(),
            "Completion received"
        );

        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;

    #[test]
    fn test_request_body_shape() {
        let req = ChatRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![Message::system("be brief"), Message::user("hi")],
            temperature: Some(0.4),
            max_tokens: Some(64),
        };
        let body = OpenAICompatProvider::request_body(&req);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["max_tokens"], 64);
        assert!((body["temperature"].as_f64().unwrap() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_request_body_omits_unset_options() {
        let req = ChatRequest {
            model: "m".into(),
            messages: vec![Message::user("x")],
            ..Default::default()
        };
        let body = OpenAICompatProvider::request_body(&req);
        assert!(body.get("temperature").is_none());
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let p = OpenAICompatProvider::new(
            "local",
            String::new(),
            "http://localhost:8000/v1/".into(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(p.base_url, "http://localhost:8000/v1");
        assert_eq!(p.id(), "local");
    }

    #[test]
    fn test_retry_after_parsing() {
        let mut headers = reqwest::header::HeaderMap::new();
        assert_eq!(retry_after_ms(&headers), 0);
        headers.insert(reqwest::header::RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after_ms(&headers), 7000);
    }
}
