// src/optimizer/rewriter.rs — Model calls that rewrite prompts and spin variants

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::gradient::{gradient_magnitude, rewrite_temperature, variant_temperature, Guidance};
use crate::core::deadline::WorkerPool;
use crate::core::prompt::Prompt;
use crate::infra::config::OptimizerConfig;
use crate::infra::errors::ArcherError;
use crate::provider::{ChatRequest, Message, ModelProvider};
use crate::util::preview;

const REWRITER_SYSTEM: &str = "You are an expert prompt engineer. You improve instructions \
given to a language model. Reply with the new prompt text only: no preamble, no explanation, \
no code fences.";

/// Shared by every optimization backend. Cheap to clone.
#[derive(Clone)]
pub struct PromptRewriter {
    provider: Arc<dyn ModelProvider>,
    config: OptimizerConfig,
    pool: WorkerPool,
}

impl PromptRewriter {
    pub fn new(provider: Arc<dyn ModelProvider>, config: OptimizerConfig, pool: WorkerPool) -> Self {
        Self {
            provider,
            config,
            pool,
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Rewrite `prompt` guided by its score and feedback. Falls back to the
    /// original content on any failure.
    pub async fn optimize_prompt(&self, prompt: &Prompt, feedback: &str, score: f32) -> String {
        self.try_optimize_prompt(prompt, feedback, score, None)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(prompt_id = %prompt.id, error = %e, "Rewrite failed, keeping original");
                prompt.content().to_string()
            })
    }

    /// One rewrite attempt under `optimize_timeout`. `critique` is extra
    /// guidance from a backward step, when one ran.
    pub async fn try_optimize_prompt(
        &self,
        prompt: &Prompt,
        feedback: &str,
        score: f32,
        critique: Option<&str>,
    ) -> Result<String, ArcherError> {
        let magnitude = gradient_magnitude(score, self.config.max_score);
        let temperature = rewrite_temperature(self.config.temperature, magnitude);
        self.rewrite(prompt, feedback, score, critique, temperature, self.config.optimize_timeout())
            .await
    }

    pub(crate) async fn rewrite(
        &self,
        prompt: &Prompt,
        feedback: &str,
        score: f32,
        critique: Option<&str>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<String, ArcherError> {
        let guidance = Guidance::for_score(score);
        let mut user = format!(
            "Guidance: {label}. {instruction}\n\n\
             Score: {score:.2} / {max}\n\n\
             ## Evaluator feedback\n{feedback}\n\n",
            label = guidance.label(),
            instruction = guidance.instruction(),
            max = self.config.max_score,
            feedback = if feedback.trim().is_empty() { "(none)" } else { feedback },
        );
        if let Some(critique) = critique {
            user.push_str(&format!("## Critique\n{critique}\n\n"));
        }
        user.push_str(&format!("## Current prompt\n{}", prompt.content()));

        tracing::debug!(
            prompt_id = %prompt.id,
            guidance = guidance.label(),
            temperature,
            "Requesting rewrite"
        );
        let raw = self
            .complete("rewrite", REWRITER_SYSTEM, user, temperature, timeout)
            .await?;
        let cleaned = clean_rewrite(&raw);
        if cleaned.is_empty() {
            return Err(ArcherError::Optimization("rewrite came back empty".into()));
        }
        Ok(cleaned)
    }

    /// One bounded model call returning the raw first-choice text.
    pub(crate) async fn complete(
        &self,
        operation: &str,
        system: &str,
        user: String,
        temperature: f32,
        timeout: Duration,
    ) -> Result<String, ArcherError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![Message::system(system), Message::user(user)],
            temperature: Some(temperature),
            max_tokens: self.config.max_tokens,
        };
        let provider = &self.provider;
        self.pool
            .run(timeout, async move {
                let response = provider.chat(request).await?;
                Ok::<_, ArcherError>(response.first_content(provider.id())?.to_string())
            })
            .await
            .into_result(operation, timeout)
    }

    /// Up to `num_variants` stylistic variants per base prompt, ordered by
    /// base then variant index. Each slot makes at most `max_retries`
    /// attempts and keeps its first success. All slots share a budget of
    /// `base.len() * num_variants * 2` attempts; once it is spent no new
    /// call starts.
    pub async fn generate_prompt_variants(
        &self,
        base: &[Prompt],
        traits: &[String],
        num_variants: usize,
        max_retries: u32,
    ) -> Vec<Prompt> {
        let max_attempts = base.len() * num_variants * 2;
        if max_attempts == 0 {
            return Vec::new();
        }
        let attempts = AtomicUsize::new(0);
        let attempts = &attempts;

        let slots = base.iter().flat_map(|prompt| {
            (0..num_variants).map(move |index| async move {
                let style = variant_trait(traits, index);
                for retry in 0..max_retries.max(1) {
                    if attempts.fetch_add(1, Ordering::SeqCst) >= max_attempts {
                        tracing::debug!(prompt_id = %prompt.id, variant = index, "Variant budget spent");
                        return None;
                    }
                    match self.variant_attempt(prompt, style, index, retry).await {
                        Ok(text) => return Some(prompt.derive(text)),
                        Err(e) => tracing::warn!(
                            prompt_id = %prompt.id,
                            variant = index,
                            attempt = retry + 1,
                            error = %e,
                            "Variant attempt failed"
                        ),
                    }
                }
                None
            })
        });

        let variants: Vec<Prompt> = futures::future::join_all(slots)
            .await
            .into_iter()
            .flatten()
            .collect();
        tracing::debug!(
            requested = base.len() * num_variants,
            produced = variants.len(),
            attempts = attempts.load(Ordering::SeqCst).min(max_attempts),
            "Variants generated"
        );
        variants
    }

    async fn variant_attempt(
        &self,
        prompt: &Prompt,
        style: &str,
        index: usize,
        retry: u32,
    ) -> Result<String, ArcherError> {
        let temperature = variant_temperature(self.config.temperature, index, retry);
        let user = format!(
            "Write a variant of the prompt below that is {style}. Keep its purpose, \
             inputs and placeholders intact.\n\n## Prompt\n{}",
            prompt.content()
        );
        tracing::debug!(
            prompt = %preview(prompt.content(), 60),
            variant = index,
            attempt = retry + 1,
            temperature,
            "Requesting variant"
        );
        let raw = self
            .complete("variant", REWRITER_SYSTEM, user, temperature, self.config.variant_timeout())
            .await?;
        let cleaned = clean_rewrite(&raw);
        if cleaned.is_empty() {
            return Err(ArcherError::Optimization("variant came back empty".into()));
        }
        Ok(cleaned)
    }
}

fn variant_trait(traits: &[String], index: usize) -> &str {
    if traits.is_empty() {
        "different in phrasing but equivalent in intent"
    } else {
        &traits[index % traits.len()]
    }
}

/// Strip what models wrap around a bare prompt: code fences, a leading
/// label such as "Improved prompt:", and matching outer quotes.
pub fn clean_rewrite(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(inner) = text.strip_prefix("```") {
        // drop the info string (```text, ```markdown) up to the first newline
        let inner = match inner.find('\n') {
            Some(nl) => &inner[nl + 1..],
            None => inner,
        };
        text = inner.trim_end().strip_suffix("```").unwrap_or(inner).trim();
    }

    for label in ["improved prompt:", "new prompt:", "rewritten prompt:", "prompt:"] {
        if text.len() >= label.len()
            && text.is_char_boundary(label.len())
            && text[..label.len()].eq_ignore_ascii_case(label)
        {
            text = text[label.len()..].trim();
            break;
        }
    }

    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”')] {
        if text.len() >= 2 && text.starts_with(open) && text.ends_with(close) {
            text = text[open.len_utf8()..text.len() - close.len_utf8()].trim();
            break;
        }
    }

    text.to_string()
}
