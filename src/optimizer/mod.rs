// src/optimizer/mod.rs — Prompt optimizer facade

pub mod backend;
pub mod gradient;
pub mod rewriter;
pub mod textgrad;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::deadline::WorkerPool;
use crate::core::model::PromptModel;
use crate::core::prompt::Prompt;
use crate::core::types::{Feedback, PromptFeedback};
use crate::infra::config::OptimizerConfig;
use crate::infra::errors::ArcherError;
use crate::provider::ModelProvider;
use backend::{FallbackBackend, OptimizationBackend, StandardBackend};
use rewriter::PromptRewriter;
use textgrad::GradientBackend;

/// Rewrites prompts, spins variants and runs the configured backend.
/// Public operations never fail; errors degrade to "no change".
pub struct PromptOptimizer {
    rewriter: PromptRewriter,
    backend: Box<dyn OptimizationBackend>,
}

impl PromptOptimizer {
    pub fn new(provider: Arc<dyn ModelProvider>, config: OptimizerConfig) -> Result<Self, ArcherError> {
        let pool = WorkerPool::new(config.max_concurrency);
        Self::with_pool(provider, config, pool)
    }

    /// Run every rewrite and variant call on `pool` instead of a private one.
    /// `config.max_concurrency` is not consulted.
    pub fn with_pool(
        provider: Arc<dyn ModelProvider>,
        config: OptimizerConfig,
        pool: WorkerPool,
    ) -> Result<Self, ArcherError> {
        config.validate()?;
        let rewriter = PromptRewriter::new(provider, config, pool);

        let standard = Box::new(StandardBackend::new(rewriter.clone()));
        let backend: Box<dyn OptimizationBackend> = if rewriter.config().gradient_enabled {
            Box::new(FallbackBackend::new(
                Box::new(GradientBackend::new(rewriter.clone())),
                standard,
            ))
        } else {
            standard
        };
        tracing::debug!(backend = backend.name(), "Prompt optimizer ready");

        Ok(Self { rewriter, backend })
    }

    /// Swap the strategy, keeping the rewriter.
    pub fn with_backend(mut self, backend: Box<dyn OptimizationBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        self.rewriter.config()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub async fn optimize_prompt(&self, prompt: &Prompt, feedback: &str, score: f32) -> String {
        self.rewriter.optimize_prompt(prompt, feedback, score).await
    }

    pub async fn generate_prompt_variants(
        &self,
        base: &[Prompt],
        traits: &[String],
        num_variants: usize,
        max_retries: u32,
    ) -> Vec<Prompt> {
        self.rewriter
            .generate_prompt_variants(base, traits, num_variants, max_retries)
            .await
    }

    /// Candidate pool for the next selection round. A failing backend yields
    /// the batch's prompts unchanged.
    pub async fn optimize(&self, batch: &[PromptFeedback]) -> Vec<Prompt> {
        if batch.is_empty() {
            return Vec::new();
        }
        match self.backend.optimize(batch).await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), error = %e, "Optimization failed, keeping originals");
                backend::scored_originals(batch)
            }
        }
    }

    /// Rewrite a named model in place. `false` means nothing changed.
    pub async fn optimize_model(
        &self,
        model: &mut PromptModel,
        feedback: &BTreeMap<String, Feedback>,
    ) -> bool {
        if model.trainable_ids().is_empty() {
            return false;
        }
        let mut working = model.clone();
        match self.backend.optimize_model(&mut working, feedback).await {
            Ok(true) => {
                *model = working;
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!(backend = self.backend.name(), error = %e, "Model optimization failed");
                false
            }
        }
    }
}
