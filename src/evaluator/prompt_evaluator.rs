// src/evaluator/prompt_evaluator.rs — Simulation-based scoring and quantile selection

use std::cmp::Ordering;
use std::sync::Arc;

use super::Evaluator;
use crate::core::generator::{is_failed_output, Generator};
use crate::core::prompt::Prompt;
use crate::core::types::{InputRow, ScoredPrompt, SimulationResult};
use crate::util::join_distinct;

/// Estimates each candidate's quality by running it through repeated
/// generate-then-evaluate trials.
pub struct PromptEvaluator {
    generator: Generator,
    evaluator: Arc<Evaluator>,
}

impl PromptEvaluator {
    /// `generator` is owned outright; its active set is overwritten per candidate.
    pub fn new(generator: Generator, evaluator: Arc<Evaluator>) -> Self {
        Self {
            generator,
            evaluator,
        }
    }

    /// One entry per prompt, in input order. Trial `i` runs on
    /// `inputs[i % inputs.len()]`.
    pub async fn evaluate_prompts(
        &mut self,
        prompts: &[Prompt],
        inputs: &[InputRow],
        num_simulations: usize,
    ) -> Vec<ScoredPrompt> {
        let mut results = Vec::with_capacity(prompts.len());

        for prompt in prompts {
            self.generator.set_prompts(vec![prompt.clone()]);
            let mut simulations = Vec::new();

            if !inputs.is_empty() {
                for trial in 0..num_simulations {
                    let input = &inputs[trial % inputs.len()];
                    let Some((content, _)) = self.generator.generate(input).await.into_iter().next()
                    else {
                        continue;
                    };
                    if is_failed_output(&content) {
                        tracing::debug!(prompt_id = %prompt.id, trial, "Trial produced no output");
                        continue;
                    }
                    let evaluation = self.evaluator.evaluate(&content, input).await;
                    simulations.push(SimulationResult {
                        input: input.clone(),
                        content,
                        evaluation,
                    });
                }
            }

            let average_score = if simulations.is_empty() {
                0.0
            } else {
                simulations.iter().map(|s| s.evaluation.score).sum::<f32>()
                    / simulations.len() as f32
            };
            tracing::debug!(
                prompt_id = %prompt.id,
                average_score,
                trials = simulations.len(),
                "Candidate simulated"
            );

            results.push(ScoredPrompt {
                prompt: prompt.clone(),
                average_score,
                simulations,
            });
        }

        results
    }

    pub async fn evaluate_and_select_best(
        &mut self,
        prompts: &[Prompt],
        inputs: &[InputRow],
        num_simulations: usize,
        quantile: f64,
    ) -> Vec<Prompt> {
        if prompts.is_empty() {
            return Vec::new();
        }
        let scored = self.evaluate_prompts(prompts, inputs, num_simulations).await;
        select_best_prompts(scored, quantile)
            .into_iter()
            .map(into_scored_prompt)
            .collect()
    }
}

/// The candidate with its simulated average recorded as its score.
pub fn into_scored_prompt(scored: ScoredPrompt) -> Prompt {
    let feedback = join_distinct(
        scored
            .simulations
            .iter()
            .map(|s| s.evaluation.feedback.as_str()),
    );
    let mut prompt = scored.prompt;
    let feedback = if feedback.is_empty() {
        prompt.feedback.clone()
    } else {
        feedback
    };
    prompt.record_evaluation(scored.average_score, feedback);
    prompt
}

/// Stable descending sort by average score, keeping
/// `max(1, floor(n * quantile))` entries. Empty input stays empty.
pub fn select_best_prompts(mut results: Vec<ScoredPrompt>, quantile: f64) -> Vec<ScoredPrompt> {
    if results.is_empty() {
        return results;
    }
    let keep = ((results.len() as f64 * quantile).floor() as usize)
        .max(1)
        .min(results.len());
    results.sort_by(|a, b| {
        b.average_score
            .partial_cmp(&a.average_score)
            .unwrap_or(Ordering::Equal)
    });
    results.truncate(keep);
    results
}
