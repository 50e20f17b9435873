// src/optimizer/backend.rs — Optimization strategies behind one trait

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::rewriter::PromptRewriter;
use crate::core::model::PromptModel;
use crate::core::prompt::{dedup_by_content, Prompt};
use crate::core::types::{Feedback, PromptFeedback};
use crate::infra::errors::ArcherError;

/// A strategy that turns scored prompts into a candidate pool, or mutates a
/// named [`PromptModel`] in place.
#[async_trait]
pub trait OptimizationBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn optimize(&self, batch: &[PromptFeedback]) -> Result<Vec<Prompt>, ArcherError>;

    /// `Ok(false)` when nothing was rewritten. On `Err` the model is untouched.
    async fn optimize_model(
        &self,
        model: &mut PromptModel,
        feedback: &BTreeMap<String, Feedback>,
    ) -> Result<bool, ArcherError>;
}

/// The batch's prompts carrying the scores and feedback they were judged with.
pub(crate) fn scored_originals(batch: &[PromptFeedback]) -> Vec<Prompt> {
    batch
        .iter()
        .map(|item| {
            let mut p = item.prompt.clone();
            p.record_evaluation(item.score, item.feedback.clone());
            p
        })
        .collect()
}

/// Feedback for parameter `id`, falling back to the prompt's own estimate.
pub(crate) fn feedback_for(
    model: &PromptModel,
    id: &str,
    feedback: &BTreeMap<String, Feedback>,
) -> Option<Feedback> {
    if let Some(f) = feedback.get(id) {
        return Some(f.clone());
    }
    model.get(id).map(|p| Feedback {
        feedback: p.prompt.feedback.clone(),
        score: p.prompt.score,
    })
}

/// Improved prompts, then (optionally) the originals, then variants of the
/// improved set, de-duplicated by content.
pub(crate) async fn assemble_pool(
    rewriter: &PromptRewriter,
    improved: Vec<Prompt>,
    originals: Vec<Prompt>,
) -> Vec<Prompt> {
    let config = rewriter.config();
    let variants = match tokio::time::timeout(
        config.variant_phase_timeout(),
        rewriter.generate_prompt_variants(
            &improved,
            &config.variant_traits,
            config.num_variants,
            config.max_retries,
        ),
    )
    .await
    {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!(
                timeout_secs = config.variant_phase_timeout_secs,
                "Variant phase timed out, continuing without variants"
            );
            Vec::new()
        }
    };

    let mut pool = improved;
    if config.retain_parents {
        pool.extend(originals);
    }
    pool.extend(variants);
    dedup_by_content(pool)
}

/// Rewrite every prompt, then spin variants of the rewrites.
pub struct StandardBackend {
    rewriter: PromptRewriter,
}

impl StandardBackend {
    pub fn new(rewriter: PromptRewriter) -> Self {
        Self { rewriter }
    }
}

#[async_trait]
impl OptimizationBackend for StandardBackend {
    fn name(&self) -> &'static str {
        "standard"
    }

    async fn optimize(&self, batch: &[PromptFeedback]) -> Result<Vec<Prompt>, ArcherError> {
        let originals = scored_originals(batch);

        let rewrites = originals.iter().map(|p| {
            let feedback = p.feedback.clone();
            async move {
                self.rewriter
                    .try_optimize_prompt(p, &feedback, p.score, None)
                    .await
                    .map(|text| p.derive(text))
            }
        });
        let results = futures::future::join_all(rewrites).await;

        let mut improved = Vec::new();
        for (result, original) in results.into_iter().zip(&originals) {
            match result {
                Ok(p) => improved.push(p),
                Err(e) => tracing::warn!(
                    prompt_id = %original.id,
                    error = %e,
                    "Rewrite failed"
                ),
            }
        }

        if improved.is_empty() {
            tracing::warn!(batch = batch.len(), "Every rewrite failed, returning originals");
            return Ok(originals);
        }
        tracing::info!(
            rewritten = improved.len(),
            batch = batch.len(),
            "Standard rewrite phase done"
        );

        Ok(assemble_pool(&self.rewriter, improved, originals).await)
    }

    async fn optimize_model(
        &self,
        model: &mut PromptModel,
        feedback: &BTreeMap<String, Feedback>,
    ) -> Result<bool, ArcherError> {
        let ids = model.trainable_ids();
        if ids.is_empty() {
            return Ok(false);
        }

        let view: &PromptModel = model;
        let jobs = ids.iter().filter_map(|id| {
            let param = view.get(id)?;
            let fb = feedback_for(view, id, feedback)?;
            let prompt = param.prompt.clone();
            Some(async move {
                let result = self
                    .rewriter
                    .try_optimize_prompt(&prompt, &fb.feedback, fb.score, None)
                    .await;
                (id.clone(), fb, result)
            })
        });
        let results = futures::future::join_all(jobs).await;

        let mut updated = false;
        for (id, fb, result) in results {
            match result {
                Ok(text) => {
                    if let Some(param) = model.get_mut(&id) {
                        param.prompt.update(text, fb.score, fb.feedback);
                        updated = true;
                    }
                }
                Err(e) => tracing::warn!(param = %id, error = %e, "Parameter rewrite failed, skipping"),
            }
        }
        Ok(updated)
    }
}

/// Try `primary`; on any error run `fallback` from scratch.
pub struct FallbackBackend {
    primary: Box<dyn OptimizationBackend>,
    fallback: Box<dyn OptimizationBackend>,
}

impl FallbackBackend {
    pub fn new(primary: Box<dyn OptimizationBackend>, fallback: Box<dyn OptimizationBackend>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl OptimizationBackend for FallbackBackend {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    async fn optimize(&self, batch: &[PromptFeedback]) -> Result<Vec<Prompt>, ArcherError> {
        match self.primary.optimize(batch).await {
            Ok(pool) => Ok(pool),
            Err(e) => {
                tracing::warn!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %e,
                    "Optimization backend failed, falling back"
                );
                self.fallback.optimize(batch).await
            }
        }
    }

    async fn optimize_model(
        &self,
        model: &mut PromptModel,
        feedback: &BTreeMap<String, Feedback>,
    ) -> Result<bool, ArcherError> {
        match self.primary.optimize_model(model, feedback).await {
            Ok(updated) => Ok(updated),
            Err(e) => {
                tracing::warn!(
                    primary = self.primary.name(),
                    fallback = self.fallback.name(),
                    error = %e,
                    "Model optimization failed, falling back"
                );
                self.fallback.optimize_model(model, feedback).await
            }
        }
    }
}
