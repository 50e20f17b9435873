// src/core/validation.rs — Optional human review of AI evaluations

use async_trait::async_trait;

use super::types::{EvaluationResult, InputRow};
use crate::infra::errors::ArcherError;

/// Shows an output and its AI evaluation to a person, returning the
/// evaluation they confirmed or corrected. The caller keeps the AI
/// evaluation when this fails.
#[async_trait]
pub trait HumanValidator: Send + Sync {
    async fn present_for_validation(
        &self,
        input: &InputRow,
        content: &str,
        ai_evaluation: &EvaluationResult,
    ) -> Result<EvaluationResult, ArcherError>;
}

/// Validated evaluation, or the AI one when review fails.
pub async fn validate_or_keep(
    validator: &dyn HumanValidator,
    input: &InputRow,
    content: &str,
    ai_evaluation: EvaluationResult,
) -> (EvaluationResult, bool) {
    match validator
        .present_for_validation(input, content, &ai_evaluation)
        .await
    {
        Ok(reviewed) => (reviewed, true),
        Err(e) => {
            tracing::warn!(error = %e, "Human validation failed, keeping AI evaluation");
            (ai_evaluation, false)
        }
    }
}
