// src/provider/mod.rs — Model call interface

pub mod openai_compat;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::infra::errors::ArcherError;

/// The one external call the core depends on. Generator, Evaluator and
/// PromptOptimizer all go through this trait.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn id(&self) -> &str;

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ArcherError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Concatenated message text; handy for matching in logs and tests.
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub message: Message,
}

impl ChatResponse {
    /// A response carrying a single assistant message.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                message: Message::assistant(content),
            }],
            usage: TokenUsage::default(),
        }
    }

    /// Content of the first choice. Missing choices or blank content are a
    /// soft failure the caller maps to its fallback value.
    pub fn first_content(&self, provider: &str) -> Result<&str, ArcherError> {
        self.choices
            .first()
            .map(|c| c.message.content.as_str())
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ArcherError::EmptyResponse {
                provider: provider.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default, alias = "prompt_tokens")]
    pub input_tokens: u32,
    #[serde(default, alias = "completion_tokens")]
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── ChatResponse tests ─────────────────────────────────────

    #[test]
    fn test_first_content() {
        let r = ChatResponse::text("hello");
        assert_eq!(r.first_content("mock").unwrap(), "hello");
    }

    #[test]
    fn test_first_content_empty_choices_is_soft_failure() {
        let r = ChatResponse::default();
        assert!(matches!(
            r.first_content("mock"),
            Err(ArcherError::EmptyResponse { .. })
        ));
    }

    #[test]
    fn test_first_content_blank_is_soft_failure() {
        let r = ChatResponse::text("   \n");
        assert!(r.first_content("mock").is_err());
    }

    #[test]
    fn test_parse_openai_shape() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "Hi"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3}
        }"#;
        let r: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(r.first_content("x").unwrap(), "Hi");
        assert_eq!(r.usage.total(), 15);
    }

    // ─── Message tests ──────────────────────────────────────────

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").role, Role::User);
        assert_eq!(Message::assistant("a").role, Role::Assistant);
    }

    #[test]
    fn test_request_text_joins_messages() {
        let req = ChatRequest {
            model: "m".into(),
            messages: vec![Message::system("one"), Message::user("two")],
            ..Default::default()
        };
        assert_eq!(req.text(), "one\ntwo");
    }
}
