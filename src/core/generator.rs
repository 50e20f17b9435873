// src/core/generator.rs — Run active prompts against an input

use std::sync::Arc;

use minijinja::Environment;

use super::deadline::WorkerPool;
use super::prompt::Prompt;
use super::types::InputRow;
use crate::infra::config::GeneratorConfig;
use crate::infra::errors::ArcherError;
use crate::provider::{ChatRequest, Message, ModelProvider};

/// Prefix of the content recorded for a failed generation call.
pub const ERROR_PREFIX: &str = "Error: ";

/// True when `content` is a failed-call placeholder rather than model output.
pub fn is_failed_output(content: &str) -> bool {
    content.starts_with(ERROR_PREFIX) || content.trim().is_empty()
}

/// Executes each active prompt against an input via the model provider.
#[derive(Clone)]
pub struct Generator {
    provider: Arc<dyn ModelProvider>,
    config: GeneratorConfig,
    pool: WorkerPool,
    prompts: Vec<Prompt>,
}

impl Generator {
    pub fn new(provider: Arc<dyn ModelProvider>, config: GeneratorConfig) -> Self {
        let pool = WorkerPool::new(config.max_concurrency);
        Self {
            provider,
            config,
            pool,
            prompts: Vec::new(),
        }
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    pub fn set_prompts(&mut self, prompts: Vec<Prompt>) {
        self.prompts = prompts;
    }

    pub fn prompts(&self) -> &[Prompt] {
        &self.prompts
    }

    /// One output per active prompt, in order. Failed calls yield
    /// `"Error: <message>"` content instead of aborting the batch.
    pub async fn generate(&self, input: &InputRow) -> Vec<(String, Prompt)> {
        if self.prompts.is_empty() {
            return Vec::new();
        }

        let calls = self.prompts.iter().map(|prompt| async move {
            let outcome = self
                .pool
                .run(self.config.timeout(), self.call(prompt, input))
                .await;
            let content = match outcome.into_result("generate", self.config.timeout()) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(prompt_id = %prompt.id, error = %e, "Generation failed");
                    format!("{ERROR_PREFIX}{e}")
                }
            };
            (content, prompt.clone())
        });

        futures::future::join_all(calls).await
    }

    async fn call(&self, prompt: &Prompt, input: &InputRow) -> Result<String, ArcherError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message::system(render_prompt(prompt.content(), input)),
                Message::user(input.as_text()),
            ],
            temperature: Some(self.config.temperature),
            max_tokens: self.config.max_tokens,
        };
        let response = self.provider.chat(request).await?;
        Ok(response.first_content(self.provider.id())?.to_string())
    }
}

/// Fill `{{ input }}` / `{{ <field> }}` placeholders. Content that is not a
/// valid template is used as-is.
pub fn render_prompt(template: &str, input: &InputRow) -> String {
    if !template.contains("{{") && !template.contains("{%") {
        return template.to_string();
    }

    let mut ctx = input.fields.clone();
    ctx.entry(super::types::INPUT_FIELD.to_string())
        .or_insert_with(|| input.as_text());

    let env = Environment::new();
    match env.render_str(template, &ctx) {
        Ok(rendered) => rendered,
        Err(e) => {
            tracing::debug!(error = %e, "Prompt is not a valid template, using raw content");
            template.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::provider::ChatResponse;
    use std::sync::Mutex;

    struct EchoProvider {
        seen: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ModelProvider for EchoProvider {
        fn id(&self) -> &str {
            "echo"
        }

        async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ArcherError> {
            let system = request.messages[0].content.clone();
            self.seen.lock().unwrap().push(request);
            if system.contains("FAIL") {
                return Err(ArcherError::Provider {
                    provider: "echo".into(),
                    message: "boom".into(),
                    retriable: false,
                });
            }
            if system.contains("EMPTY") {
                return Ok(ChatResponse::default());
            }
            Ok(ChatResponse::text(format!("out:{system}")))
        }
    }

    fn generator() -> (Generator, Arc<EchoProvider>) {
        let provider = Arc::new(EchoProvider {
            seen: Mutex::new(Vec::new()),
        });
        (
            Generator::new(provider.clone(), GeneratorConfig::default()),
            provider,
        )
    }

    #[tokio::test]
    async fn test_empty_active_set_returns_empty() {
        let (generator, provider) = generator();
        let out = generator.generate(&InputRow::text("hi")).await;
        assert!(out.is_empty());
        assert!(provider.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outputs_preserve_prompt_order() {
        let (mut generator, _) = generator();
        generator.set_prompts(vec![Prompt::new("A"), Prompt::new("B"), Prompt::new("C")]);
        let out = generator.generate(&InputRow::text("hi")).await;
        let contents: Vec<&str> = out.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(contents, vec!["out:A", "out:B", "out:C"]);
        assert_eq!(out[2].1.content(), "C");
    }

    #[tokio::test]
    async fn test_failure_becomes_error_content() {
        let (mut generator, _) = generator();
        generator.set_prompts(vec![Prompt::new("ok"), Prompt::new("FAIL"), Prompt::new("EMPTY")]);
        let out = generator.generate(&InputRow::text("hi")).await;
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].0, "out:ok");
        assert!(out[1].0.starts_with("Error: "));
        assert!(out[1].0.contains("boom"));
        assert!(out[2].0.starts_with("Error: "));
        assert!(!is_failed_output(&out[0].0));
        assert!(is_failed_output(&out[1].0));
    }

    #[tokio::test]
    async fn test_request_carries_rendered_prompt_and_input() {
        let (mut generator, provider) = generator();
        generator.set_prompts(vec![Prompt::new("Translate to French: {{ input }}")]);
        generator.generate(&InputRow::text("good morning")).await;

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].messages[0].content, "Translate to French: good morning");
        assert_eq!(seen[0].messages[1].content, "good morning");
        assert_eq!(seen[0].model, GeneratorConfig::default().model);
    }

    #[test]
    fn test_render_named_fields() {
        let mut row = InputRow::default();
        row.fields.insert("topic".into(), "tides".into());
        row.fields.insert("audience".into(), "kids".into());
        assert_eq!(
            render_prompt("Explain {{ topic }} to {{ audience }}.", &row),
            "Explain tides to kids."
        );
    }

    #[test]
    fn test_render_plain_text_untouched() {
        let row = InputRow::text("x");
        assert_eq!(render_prompt("Answer {briefly}.", &row), "Answer {briefly}.");
    }

    #[test]
    fn test_render_invalid_template_falls_back() {
        let row = InputRow::text("x");
        assert_eq!(render_prompt("Broken {{ input", &row), "Broken {{ input");
    }
}
