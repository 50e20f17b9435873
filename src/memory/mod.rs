// src/memory/mod.rs — Persistence interface for prompts, outputs and evaluations

pub mod schema;
pub mod store;

use serde::{Deserialize, Serialize};

use crate::core::prompt::Prompt;
use crate::core::types::EvaluationResult;
use crate::infra::errors::ArcherError;

pub use store::Store;

/// A stored evaluation a human has confirmed or corrected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedEvaluation {
    pub output_id: String,
    pub prompt_id: String,
    pub score: f32,
    pub feedback: String,
    pub improved_output: String,
}

/// Where the loop records its history. Callers treat every error as
/// non-fatal and carry on with in-memory state.
pub trait PromptStore: Send + Sync {
    /// Insert or refresh a prompt. Returns its id.
    fn store_prompt(&self, prompt: &Prompt) -> Result<String, ArcherError>;

    /// Record one generated output. Returns the new output id.
    #[allow(clippy::too_many_arguments)]
    fn store_record(
        &self,
        input: &str,
        content: &str,
        generator_prompt_id: &str,
        evaluator_prompt_id: &str,
        generation: u32,
        round_id: &str,
    ) -> Result<String, ArcherError>;

    fn store_evaluation(
        &self,
        output_id: &str,
        prompt_id: &str,
        evaluation: &EvaluationResult,
        validated: bool,
    ) -> Result<String, ArcherError>;

    /// `false` when no prompt has that id.
    fn update_prompt_performance(
        &self,
        prompt_id: &str,
        average_score: f32,
        rounds_survived: u32,
        is_active: bool,
    ) -> Result<bool, ArcherError>;

    /// Most recent validated evaluations first.
    fn get_validated_evaluations(&self, limit: usize) -> Result<Vec<ValidatedEvaluation>, ArcherError>;
}
