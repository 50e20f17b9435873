// src/core/archer.rs — Forward/backward training loop over a prompt population

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::time::Instant;

use super::circuit_breaker::CircuitBreaker;
use super::deadline::WorkerPool;
use super::generator::{is_failed_output, Generator};
use super::model::PromptModel;
use super::prompt::{dedup_by_content, Prompt};
use super::tracker::PerformanceTracker;
use super::types::{
    EvaluationResult, Feedback, ForwardRecord, InputRow, InputSpec, PromptFeedback, ScoredPrompt,
    TrainingSummary,
};
use super::validation::{validate_or_keep, HumanValidator};
use crate::evaluator::prompt_evaluator::{into_scored_prompt, select_best_prompts, PromptEvaluator};
use crate::evaluator::Evaluator;
use crate::infra::config::{ArcherConfig, Config};
use crate::infra::errors::ArcherError;
use crate::knowledge::KnowledgeBase;
use crate::memory::PromptStore;
use crate::optimizer::PromptOptimizer;
use crate::provider::ModelProvider;
use crate::util::{join_distinct, preview};

/// Owns the active population and drives generate → evaluate → optimize →
/// select. Passes take `&mut self`, so one instance never runs two at once.
pub struct Archer {
    generator: Generator,
    evaluator: Arc<Evaluator>,
    optimizer: PromptOptimizer,
    prompt_evaluator: Option<PromptEvaluator>,
    validator: Option<Arc<dyn HumanValidator>>,
    store: Option<Arc<dyn PromptStore>>,
    tracker: PerformanceTracker,
    breaker: CircuitBreaker,
    config: ArcherConfig,
    population: Vec<Prompt>,
    generation: u32,
}

impl Archer {
    pub fn new(
        generator: Generator,
        evaluator: Arc<Evaluator>,
        optimizer: PromptOptimizer,
        config: ArcherConfig,
        seeds: Vec<Prompt>,
    ) -> Result<Self, ArcherError> {
        config.validate()?;
        let mut population = dedup_by_content(seeds);
        if population.is_empty() {
            return Err(ArcherError::Config("at least one seed prompt is required".into()));
        }
        population.truncate(config.max_prompts_per_cycle);

        let prompt_evaluator = PromptEvaluator::new(generator.clone(), evaluator.clone());
        let breaker = CircuitBreaker::new(config.error_threshold, config.recovery_duration());

        Ok(Self {
            generator,
            evaluator,
            optimizer,
            prompt_evaluator: Some(prompt_evaluator),
            validator: None,
            store: None,
            tracker: PerformanceTracker::new(),
            breaker,
            config,
            population,
            generation: 0,
        })
    }

    /// Wire every component from one config, sharing a single worker pool.
    pub fn from_config(
        provider: Arc<dyn ModelProvider>,
        config: &Config,
        seeds: Vec<Prompt>,
    ) -> Result<Self, ArcherError> {
        config.validate()?;
        let pool = WorkerPool::new(config.generator.max_concurrency);

        let generator = Generator::new(provider.clone(), config.generator.clone()).with_pool(pool.clone());
        let mut evaluator = Evaluator::new(provider.clone(), config.evaluator.clone()).with_pool(pool.clone());
        let knowledge = KnowledgeBase::load(&config.knowledge.dirs);
        if !knowledge.is_empty() {
            tracing::info!(documents = knowledge.documents().len(), "Knowledge base attached to evaluator");
            evaluator = evaluator.with_knowledge(knowledge.render(config.knowledge.max_chars));
        }
        let optimizer = PromptOptimizer::with_pool(provider, config.optimizer.clone(), pool)?;

        Self::new(generator, Arc::new(evaluator), optimizer, config.archer.clone(), seeds)
    }

    /// Attach persistence. Seeds and the rubric prompt are written right away.
    pub fn with_store(mut self, store: Arc<dyn PromptStore>) -> Self {
        self.store = Some(store);
        self.persist_prompt(&self.evaluator.rubric_prompt().clone());
        for prompt in self.population.clone() {
            self.persist_prompt(&prompt);
        }
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn HumanValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Select candidates with one local simulation each instead of the
    /// multi-trial prompt evaluator.
    pub fn without_prompt_evaluator(mut self) -> Self {
        self.prompt_evaluator = None;
        self
    }

    pub fn active_prompts(&self) -> &[Prompt] {
        &self.population
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }

    /// Highest-scoring active prompt; the first one on ties.
    pub fn best_prompt(&self) -> Option<&Prompt> {
        self.population.iter().reduce(|best, p| if p.score > best.score { p } else { best })
    }

    // ─── Forward pass ───────────────────────────────────────────

    /// Generate and evaluate every active prompt on every input row. Always
    /// advances the generation counter by one.
    pub async fn run_forward_pass(&mut self, input: &InputSpec) -> Vec<ForwardRecord> {
        self.population.truncate(self.config.max_prompts_per_cycle);
        self.generator.set_prompts(self.population.clone());

        let rows = input.expand();
        let round_id = uuid::Uuid::new_v4().to_string();
        if rows.is_empty() {
            tracing::warn!(generation = self.generation, "Input expanded to no rows");
        }

        let mut records = Vec::new();
        for row in &rows {
            let outputs = self.generator.generate(row).await;
            let evaluations = futures::future::join_all(
                outputs
                    .iter()
                    .map(|(content, _)| self.evaluator.evaluate(content, row)),
            )
            .await;

            for ((content, prompt), ai_evaluation) in outputs.into_iter().zip(evaluations) {
                let (evaluation, validated) = match &self.validator {
                    Some(v) => validate_or_keep(v.as_ref(), row, &content, ai_evaluation).await,
                    None => (ai_evaluation, false),
                };
                let output_id = self.persist_output(row, &content, &prompt, &evaluation, validated, &round_id);
                records.push(ForwardRecord {
                    prompt,
                    input: row.clone(),
                    content,
                    evaluation,
                    output_id,
                });
            }
        }

        self.tracker
            .record_generation(self.generation, &self.population, &records);
        tracing::info!(
            generation = self.generation,
            prompts = self.population.len(),
            rows = rows.len(),
            records = records.len(),
            "Forward pass complete"
        );
        self.generation += 1;
        records
    }

    // ─── Backward pass ──────────────────────────────────────────

    /// Optimize and reselect the population from `records`. `false` leaves
    /// the population untouched: no records, breaker open, or a failed pass.
    pub async fn run_backward_pass(&mut self, records: &[ForwardRecord]) -> bool {
        if records.is_empty() {
            tracing::debug!("No records, skipping backward pass");
            return false;
        }
        if let Err(e) = self.breaker.try_acquire(Instant::now()) {
            tracing::warn!(error = %e, "Backward pass skipped");
            return false;
        }

        match self.backward(records).await {
            Ok(selected) => {
                self.commit_population(selected);
                self.breaker.record_success();
                true
            }
            Err(e) => {
                self.breaker.record_failure(Instant::now());
                tracing::warn!(
                    error = %e,
                    consecutive_errors = self.breaker.consecutive_errors(),
                    "Backward pass failed"
                );
                false
            }
        }
    }

    async fn backward(&mut self, records: &[ForwardRecord]) -> Result<Vec<Prompt>, ArcherError> {
        let mut batch = aggregate_feedback(records);
        self.merge_validated_feedback(&mut batch);

        let pool = if self.config.use_model_optimization {
            self.optimize_as_model(&batch).await?
        } else {
            self.optimizer.optimize(&batch).await
        };

        let known: HashSet<&str> = batch.iter().map(|b| b.prompt.content()).collect();
        let fresh = pool.iter().filter(|p| !known.contains(p.content())).count();
        if fresh == 0 {
            return Err(ArcherError::Optimization(
                "optimizer produced no new candidates".into(),
            ));
        }
        tracing::info!(candidates = pool.len(), fresh, "Candidate pool ready");

        let inputs = distinct_inputs(records);
        let mut selected = match &mut self.prompt_evaluator {
            Some(pe) => {
                pe.evaluate_and_select_best(
                    &pool,
                    &inputs,
                    self.config.num_simulations,
                    self.config.selection_quantile,
                )
                .await
            }
            None => {
                let last = &records[records.len() - 1].input;
                select_locally(
                    &mut self.generator,
                    &self.evaluator,
                    pool,
                    last,
                    self.config.max_prompts_per_cycle,
                )
                .await
            }
        };
        selected.truncate(self.config.max_prompts_per_cycle);

        if selected.is_empty() {
            return Err(ArcherError::Optimization("selection kept no prompts".into()));
        }
        Ok(selected)
    }

    async fn optimize_as_model(&self, batch: &[PromptFeedback]) -> Result<Vec<Prompt>, ArcherError> {
        let mut model = PromptModel::from_prompts(batch.iter().map(|b| b.prompt.clone()));
        let feedback: BTreeMap<String, Feedback> = batch
            .iter()
            .map(|b| {
                (
                    b.prompt.id.clone(),
                    Feedback {
                        feedback: b.feedback.clone(),
                        score: b.score,
                    },
                )
            })
            .collect();

        if !self.optimizer.optimize_model(&mut model, &feedback).await {
            return Err(ArcherError::Optimization("model optimization changed nothing".into()));
        }
        Ok(batch
            .iter()
            .filter_map(|b| model.get(&b.prompt.id).map(|p| p.prompt.clone()))
            .collect())
    }

    fn merge_validated_feedback(&self, batch: &mut [PromptFeedback]) {
        let Some(store) = &self.store else { return };
        if self.config.validated_feedback_limit == 0 {
            return;
        }
        let validated = match store.get_validated_evaluations(self.config.validated_feedback_limit) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load validated evaluations");
                return;
            }
        };

        let mut by_prompt: HashMap<&str, Vec<&str>> = HashMap::new();
        for v in &validated {
            by_prompt.entry(v.prompt_id.as_str()).or_default().push(v.feedback.as_str());
        }
        for item in batch.iter_mut() {
            if let Some(extra) = by_prompt.get(item.prompt.id.as_str()) {
                item.feedback = join_distinct(
                    std::iter::once(item.feedback.as_str()).chain(extra.iter().copied()),
                );
            }
        }
    }

    fn commit_population(&mut self, selected: Vec<Prompt>) {
        let kept: HashSet<&str> = selected.iter().map(|p| p.id.as_str()).collect();
        let dropped: Vec<Prompt> = self
            .population
            .iter()
            .filter(|p| !kept.contains(p.id.as_str()))
            .cloned()
            .collect();

        self.tracker.record_survivors(selected.iter().map(|p| p.id.as_str()));

        if let Some(store) = self.store.clone() {
            for prompt in &selected {
                self.persist_prompt(prompt);
                let rounds = self.tracker.rounds_survived(&prompt.id);
                if let Err(e) = store.update_prompt_performance(&prompt.id, prompt.score, rounds, true) {
                    tracing::warn!(prompt_id = %prompt.id, error = %e, "Failed to update prompt performance");
                }
            }
            for prompt in &dropped {
                if let Err(e) = store.update_prompt_performance(&prompt.id, prompt.score, 0, false) {
                    tracing::warn!(prompt_id = %prompt.id, error = %e, "Failed to retire prompt");
                }
            }
        }

        for prompt in &selected {
            tracing::debug!(
                prompt_id = %prompt.id,
                score = prompt.score,
                prompt = %preview(prompt.content(), 80),
                "Selected"
            );
        }
        tracing::info!(
            generation = self.generation,
            kept = selected.len(),
            dropped = dropped.len(),
            "Population replaced"
        );
        self.population = selected;
    }

    // ─── Training loop ──────────────────────────────────────────

    pub async fn run_training_cycle(&mut self, input: &InputSpec) -> bool {
        let records = self.run_forward_pass(input).await;
        self.run_backward_pass(&records).await
    }

    /// `num_cycles` forward/backward cycles. `input_fn` receives the cycle index.
    pub async fn run_training_loop<F>(&mut self, mut input_fn: F, num_cycles: usize) -> TrainingSummary
    where
        F: FnMut(usize) -> InputSpec,
    {
        let mut successful = 0;
        for cycle in 0..num_cycles {
            let input = input_fn(cycle);
            if self.run_training_cycle(&input).await {
                successful += 1;
            }
            tracing::info!(
                cycle = cycle + 1,
                of = num_cycles,
                generation = self.generation,
                breaker_open = self.breaker.is_open(),
                "Training cycle finished"
            );
        }
        TrainingSummary {
            cycles_run: num_cycles,
            successful_backward_passes: successful,
            final_generation: self.generation,
            best_prompt: self.best_prompt().cloned(),
        }
    }

    // ─── Persistence (best-effort) ──────────────────────────────

    fn persist_prompt(&self, prompt: &Prompt) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.store_prompt(prompt) {
            tracing::warn!(prompt_id = %prompt.id, error = %e, "Failed to store prompt");
        }
    }

    fn persist_output(
        &self,
        row: &InputRow,
        content: &str,
        prompt: &Prompt,
        evaluation: &EvaluationResult,
        validated: bool,
        round_id: &str,
    ) -> Option<String> {
        let store = self.store.as_ref()?;
        let output_id = match store.store_record(
            &row.as_text(),
            content,
            &prompt.id,
            &self.evaluator.rubric_prompt().id,
            self.generation,
            round_id,
        ) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(prompt_id = %prompt.id, error = %e, "Failed to store output");
                return None;
            }
        };
        if let Err(e) = store.store_evaluation(&output_id, &prompt.id, evaluation, validated) {
            tracing::warn!(output_id = %output_id, error = %e, "Failed to store evaluation");
        }
        Some(output_id)
    }
}

/// One entry per prompt id in first-seen order: mean score and the distinct
/// feedback strings joined.
pub fn aggregate_feedback(records: &[ForwardRecord]) -> Vec<PromptFeedback> {
    let mut order: Vec<&Prompt> = Vec::new();
    let mut grouped: HashMap<&str, Vec<&ForwardRecord>> = HashMap::new();
    for r in records {
        let group = grouped.entry(r.prompt.id.as_str()).or_default();
        if group.is_empty() {
            order.push(&r.prompt);
        }
        group.push(r);
    }

    order
        .into_iter()
        .map(|prompt| {
            let group = &grouped[prompt.id.as_str()];
            let score = group.iter().map(|r| r.evaluation.score).sum::<f32>() / group.len() as f32;
            let feedback = join_distinct(group.iter().map(|r| r.evaluation.feedback.as_str()));
            PromptFeedback::new(prompt.clone(), feedback, score)
        })
        .collect()
}

/// One simulation per candidate on `input`, keeping the best `keep`.
async fn select_locally(
    generator: &mut Generator,
    evaluator: &Evaluator,
    pool: Vec<Prompt>,
    input: &InputRow,
    keep: usize,
) -> Vec<Prompt> {
    let mut scored = Vec::with_capacity(pool.len());
    for candidate in pool {
        generator.set_prompts(vec![candidate.clone()]);
        let output = generator.generate(input).await.into_iter().next();
        let average_score = match output {
            Some((content, _)) if !is_failed_output(&content) => {
                evaluator.evaluate(&content, input).await.score
            }
            _ => 0.0,
        };
        scored.push(ScoredPrompt {
            prompt: candidate,
            average_score,
            simulations: Vec::new(),
        });
    }
    let mut best = select_best_prompts(scored, 1.0);
    best.truncate(keep);
    best.into_iter().map(into_scored_prompt).collect()
}

fn distinct_inputs(records: &[ForwardRecord]) -> Vec<InputRow> {
    let mut inputs: Vec<InputRow> = Vec::new();
    for r in records {
        if !inputs.contains(&r.input) {
            inputs.push(r.input.clone());
        }
    }
    inputs
}
