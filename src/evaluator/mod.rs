// src/evaluator/mod.rs — Rubric-based scoring of generated outputs

pub mod parser;
pub mod prompt_evaluator;

use std::sync::Arc;

use crate::core::deadline::WorkerPool;
use crate::core::prompt::Prompt;
use crate::core::types::{EvaluationResult, InputRow};
use crate::infra::config::EvaluatorConfig;
use crate::infra::errors::ArcherError;
use crate::provider::{ChatRequest, Message, ModelProvider};

/// Mid-scale score used when the judge cannot be reached or understood.
pub const FALLBACK_SCORE: f32 = 3.0;

const RESPONSE_FORMAT: &str = "Respond with a JSON object and nothing else:\n\
{\"score\": <number>, \"feedback\": \"<what to fix>\", \
\"improved_output\": \"<a better response>\", \"summary\": \"<one line>\"}";

/// Scores generated content against a rubric. Never fails: any call or
/// parse problem yields [`Evaluator::fallback`].
#[derive(Clone)]
pub struct Evaluator {
    provider: Arc<dyn ModelProvider>,
    config: EvaluatorConfig,
    pool: WorkerPool,
    rubric: Prompt,
    knowledge: Option<String>,
}

impl Evaluator {
    pub fn new(provider: Arc<dyn ModelProvider>, config: EvaluatorConfig) -> Self {
        let rubric = Prompt::new(config.rubric.clone());
        Self {
            provider,
            config,
            pool: WorkerPool::default(),
            rubric,
            knowledge: None,
        }
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    /// Reference material appended to every judge request.
    pub fn with_knowledge(mut self, knowledge: impl Into<String>) -> Self {
        let knowledge = knowledge.into();
        self.knowledge = (!knowledge.trim().is_empty()).then_some(knowledge);
        self
    }

    /// The rubric as a prompt, so stored outputs can reference its id.
    pub fn rubric_prompt(&self) -> &Prompt {
        &self.rubric
    }

    pub fn max_score(&self) -> f32 {
        self.config.max_score
    }

    pub async fn evaluate(&self, content: &str, input: &InputRow) -> EvaluationResult {
        let outcome = self
            .pool
            .run(self.config.timeout(), self.judge(content, input))
            .await;
        match outcome.into_result("evaluate", self.config.timeout()) {
            Ok(result) => {
                tracing::debug!(score = result.score, "Evaluation parsed");
                result
            }
            Err(e) => {
                tracing::warn!(error = %e, "Evaluation failed, using fallback score");
                Self::fallback(&e.to_string())
            }
        }
    }

    async fn judge(&self, content: &str, input: &InputRow) -> Result<EvaluationResult, ArcherError> {
        let response = self.provider.chat(self.build_request(content, input)).await?;
        let text = response.first_content(self.provider.id())?;
        parser::parse_evaluation(text, self.config.max_score)
    }

    fn build_request(&self, content: &str, input: &InputRow) -> ChatRequest {
        let system = format!(
            "You are a strict evaluator. Score the response from 0 to {max}.\n\n\
             ## Rubric\n{rubric}\n\n{RESPONSE_FORMAT}",
            max = self.config.max_score,
            rubric = self.rubric.content(),
        );

        let mut user = String::new();
        if let Some(knowledge) = &self.knowledge {
            user.push_str("## Reference material\n");
            user.push_str(knowledge);
            user.push_str("\n\n");
        }
        user.push_str(&format!(
            "## Input\n{}\n\n## Response to evaluate\n{}",
            input.as_text(),
            content
        ));

        ChatRequest {
            model: self.config.model.clone(),
            messages: vec![Message::system(system), Message::user(user)],
            temperature: Some(self.config.temperature),
            max_tokens: Some(1500),
        }
    }

    pub fn fallback(reason: &str) -> EvaluationResult {
        EvaluationResult {
            score: FALLBACK_SCORE,
            feedback: format!("Evaluation unavailable ({reason}); assigned a neutral score."),
            improved_output: "No improved output available.".into(),
            summary: "Fallback evaluation".into(),
        }
    }
}
