// src/core/prompt.rs — Candidate prompt with lineage history

use serde::{Deserialize, Serialize};

/// One prior state of a prompt, captured just before it was rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub content: String,
    pub score: f32,
    pub feedback: String,
}

/// A candidate instruction in the population.
///
/// Content only changes through [`Prompt::update`], which snapshots the
/// previous state into `history` and bumps `generation`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub parent_id: Option<String>,
    content: String,
    pub score: f32,
    pub feedback: String,
    generation: u32,
    history: Vec<HistoryEntry>,
}

impl Prompt {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            parent_id: None,
            content: content.into(),
            score: 0.0,
            feedback: String::new(),
            generation: 0,
            history: Vec::new(),
        }
    }

    pub fn with_score(mut self, score: f32, feedback: impl Into<String>) -> Self {
        self.score = score;
        self.feedback = feedback.into();
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Replace the content, recording the pre-update state first.
    pub fn update(&mut self, new_content: impl Into<String>, score: f32, feedback: impl Into<String>) {
        self.history.push(HistoryEntry {
            content: std::mem::take(&mut self.content),
            score: self.score,
            feedback: std::mem::take(&mut self.feedback),
        });
        self.content = new_content.into();
        self.score = score;
        self.feedback = feedback.into();
        self.generation += 1;
    }

    /// Refresh the performance estimate. Content is untouched, so no history.
    pub fn record_evaluation(&mut self, score: f32, feedback: impl Into<String>) {
        self.score = score;
        self.feedback = feedback.into();
    }

    /// A child prompt: fresh id, linked to this one, carrying its lineage.
    /// The child starts from the parent's score as a prior estimate.
    pub fn derive(&self, new_content: impl Into<String>) -> Prompt {
        let mut child = self.clone();
        child.id = uuid::Uuid::new_v4().to_string();
        child.parent_id = Some(self.id.clone());
        child.update(new_content, self.score, self.feedback.clone());
        child
    }
}

/// Drop prompts whose content already appeared earlier, keeping first occurrence.
pub fn dedup_by_content(prompts: Vec<Prompt>) -> Vec<Prompt> {
    let mut seen = std::collections::HashSet::new();
    prompts
        .into_iter()
        .filter(|p| seen.insert(p.content.clone()))
        .collect()
}
