// src/optimizer/textgrad.rs — Gradient-biased backend: backward, propose, step
//
// backward: one critique call per parameter; a failed critique drops that
//           parameter from the step.
// propose:  rewrite the top_k highest-magnitude parameters, up to
//           max_trials attempts each. A parameter with no usable proposal
//           fails the whole step.
// step:     commit proposals through Prompt::update.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::backend::{assemble_pool, feedback_for, scored_originals, OptimizationBackend};
use super::gradient::{compute_gradient, rewrite_temperature};
use super::rewriter::PromptRewriter;
use crate::core::model::{Gradient, Parameter, PromptModel};
use crate::core::prompt::Prompt;
use crate::core::types::{Feedback, PromptFeedback};
use crate::infra::errors::ArcherError;

const CRITIC_SYSTEM: &str = "You diagnose why an instruction to a language model underperforms. \
List the concrete changes that would raise its score, most important first. Be brief.";

/// Temperature added per extra proposal trial.
const TRIAL_TEMPERATURE_STEP: f32 = 0.05;

pub struct GradientBackend {
    rewriter: PromptRewriter,
}

impl GradientBackend {
    pub fn new(rewriter: PromptRewriter) -> Self {
        Self { rewriter }
    }

    /// Attach critiques. Returns ids whose backward call succeeded.
    async fn backward(&self, model: &mut PromptModel) -> Vec<String> {
        let view: &PromptModel = model;
        let jobs = view.iter().filter_map(|(id, param)| {
            let gradient = param.gradient.as_ref()?;
            let prompt = param.prompt.clone();
            let gradient = gradient.clone();
            Some(async move {
                let result = self.critique(&prompt, &gradient).await;
                (id.clone(), result)
            })
        });
        let results = futures::future::join_all(jobs).await;

        let mut ok = Vec::new();
        for (id, result) in results {
            match result {
                Ok(critique) => {
                    if let Some(g) = model.get_mut(&id).and_then(|p| p.gradient.as_mut()) {
                        g.critique = Some(critique);
                        ok.push(id);
                    }
                }
                Err(e) => {
                    tracing::warn!(param = %id, error = %e, "Backward step failed, skipping parameter");
                    if let Some(p) = model.get_mut(&id) {
                        p.gradient = None;
                    }
                }
            }
        }
        ok
    }

    async fn critique(&self, prompt: &Prompt, gradient: &Gradient) -> Result<String, ArcherError> {
        let user = format!(
            "## Prompt\n{}\n\n## Score\n{:.2} / {}\n\n## Evaluator feedback\n{}\n\n\
             Directions worth trying: {}",
            prompt.content(),
            gradient.score,
            self.rewriter.config().max_score,
            if gradient.feedback.trim().is_empty() { "(none)" } else { gradient.feedback.as_str() },
            gradient.traits.join(", "),
        );
        let config = self.rewriter.config();
        let text = self
            .rewriter
            .complete(
                "backward",
                CRITIC_SYSTEM,
                user,
                config.temperature,
                config.optimize_timeout(),
            )
            .await?;
        Ok(text.trim().to_string())
    }

    /// id → proposed content for the `top_k` highest-magnitude parameters.
    async fn propose(&self, model: &PromptModel) -> Result<BTreeMap<String, String>, ArcherError> {
        let config = self.rewriter.config();
        let mut ranked: Vec<(&String, &Parameter, &Gradient)> = model
            .iter()
            .filter(|(_, p)| p.requires_grad)
            .filter_map(|(id, p)| p.gradient.as_ref().map(|g| (id, p, g)))
            .collect();
        if ranked.is_empty() {
            return Err(ArcherError::Optimization("no gradients to propose from".into()));
        }
        ranked.sort_by(|a, b| {
            b.2.magnitude
                .partial_cmp(&a.2.magnitude)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        ranked.truncate(config.top_k);

        let jobs = ranked.into_iter().map(|(id, param, gradient)| async move {
            let mut last_err = None;
            for trial in 0..config.max_trials {
                let temperature = (rewrite_temperature(config.temperature, gradient.magnitude)
                    + trial as f32 * TRIAL_TEMPERATURE_STEP)
                    .min(1.0);
                match self
                    .rewriter
                    .rewrite(
                        &param.prompt,
                        &gradient.feedback,
                        gradient.score,
                        gradient.critique.as_deref(),
                        temperature,
                        config.optimize_timeout(),
                    )
                    .await
                {
                    Ok(text) if text != param.prompt.content() => return Ok((id.clone(), text)),
                    Ok(_) => {
                        last_err = Some(ArcherError::Optimization("proposal identical to current prompt".into()))
                    }
                    Err(e) => {
                        tracing::debug!(param = %id, trial, error = %e, "Proposal attempt failed");
                        last_err = Some(e);
                    }
                }
            }
            Err(ArcherError::Optimization(format!(
                "no proposal for {id} after {} trials: {}",
                config.max_trials,
                last_err.map(|e| e.to_string()).unwrap_or_default()
            )))
        });

        futures::future::join_all(jobs).await.into_iter().collect()
    }

    /// backward → propose on `model`, committing nothing on error.
    async fn run_step(&self, model: &mut PromptModel) -> Result<BTreeMap<String, String>, ArcherError> {
        let survivors = self.backward(model).await;
        if survivors.is_empty() {
            return Err(ArcherError::Optimization("backward pass produced no gradients".into()));
        }
        self.propose(model).await
    }

    fn attach_gradient(&self, param: &mut Parameter, feedback: Feedback) {
        let config = self.rewriter.config();
        let item = PromptFeedback::new(param.prompt.clone(), feedback.feedback, feedback.score);
        param.gradient = Some(compute_gradient(&item, &config.variant_traits, config.max_score));
    }
}

#[async_trait]
impl OptimizationBackend for GradientBackend {
    fn name(&self) -> &'static str {
        "gradient"
    }

    async fn optimize(&self, batch: &[PromptFeedback]) -> Result<Vec<Prompt>, ArcherError> {
        let originals = scored_originals(batch);
        let mut model = PromptModel::from_prompts(originals.iter().cloned());
        for item in batch {
            if let Some(param) = model.get_mut(&item.prompt.id) {
                let fb = Feedback {
                    feedback: item.feedback.clone(),
                    score: item.score,
                };
                self.attach_gradient(param, fb);
            }
        }

        let proposals = self.run_step(&mut model).await?;
        // pool mode: proposals become children so originals keep their identity
        let improved: Vec<Prompt> = originals
            .iter()
            .filter_map(|p| proposals.get(&p.id).map(|text| p.derive(text.clone())))
            .collect();
        tracing::info!(proposals = improved.len(), batch = batch.len(), "Gradient step done");

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

        let mut working = model.clone();
        for id in &ids {
            let Some(fb) = feedback_for(&working, id, feedback) else {
                continue;
            };
            if let Some(param) = working.get_mut(id) {
                self.attach_gradient(param, fb);
            }
        }

        let proposals = self.run_step(&mut working).await?;
        for (id, text) in proposals {
            if let Some(param) = working.get_mut(&id) {
                let (score, fb) = param
                    .gradient
                    .as_ref()
                    .map(|g| (g.score, g.feedback.clone()))
                    .unwrap_or((param.prompt.score, param.prompt.feedback.clone()));
                param.prompt.update(text, score, fb);
            }
        }
        working.clear_gradients();
        *model = working;
        Ok(true)
    }
}
