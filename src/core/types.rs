// src/core/types.rs — Core domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::prompt::Prompt;

/// Structured judgement of one generated output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub score: f32,
    pub feedback: String,
    pub improved_output: String,
    pub summary: String,
}

/// One concrete input: field name → value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRow {
    pub fields: BTreeMap<String, String>,
}

impl InputRow {
    pub fn text(text: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(INPUT_FIELD.to_string(), text.into());
        Self { fields }
    }

    /// Text sent as the user message. A lone `input` field is sent verbatim,
    /// anything else as `name: value` lines.
    pub fn as_text(&self) -> String {
        if self.fields.len() == 1 {
            if let Some(v) = self.fields.get(INPUT_FIELD) {
                return v.clone();
            }
        }
        self.fields
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub const INPUT_FIELD: &str = "input";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionMode {
    /// Zip fields together; stops at the shortest field.
    #[default]
    Parallel,
    /// Cartesian product over all fields.
    Combinatorial,
}

/// Multi-valued input that expands into rows for a forward pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSpec {
    pub fields: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub mode: ExpansionMode,
}

impl InputSpec {
    pub fn single(text: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(INPUT_FIELD.to_string(), vec![text.into()]);
        Self {
            fields,
            mode: ExpansionMode::Parallel,
        }
    }

    pub fn new(mode: ExpansionMode) -> Self {
        Self {
            fields: BTreeMap::new(),
            mode,
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.fields.insert(name.into(), values);
        self
    }

    pub fn expand(&self) -> Vec<InputRow> {
        if self.fields.is_empty() || self.fields.values().any(|v| v.is_empty()) {
            return Vec::new();
        }
        match self.mode {
            ExpansionMode::Parallel => {
                let n = self.fields.values().map(Vec::len).min().unwrap_or(0);
                (0..n)
                    .map(|i| InputRow {
                        fields: self
                            .fields
                            .iter()
                            .map(|(k, v)| (k.clone(), v[i].clone()))
                            .collect(),
                    })
                    .collect()
            }
            ExpansionMode::Combinatorial => {
                let mut rows = vec![InputRow::default()];
                for (name, values) in &self.fields {
                    rows = rows
                        .into_iter()
                        .flat_map(|row| {
                            values.iter().map(move |v| {
                                let mut next = row.clone();
                                next.fields.insert(name.clone(), v.clone());
                                next
                            })
                        })
                        .collect();
                }
                rows
            }
        }
    }
}

/// A prompt with the feedback and score that drive its rewrite.
#[derive(Debug, Clone)]
pub struct PromptFeedback {
    pub prompt: Prompt,
    pub feedback: String,
    pub score: f32,
}

impl PromptFeedback {
    pub fn new(prompt: Prompt, feedback: impl Into<String>, score: f32) -> Self {
        Self {
            prompt,
            feedback: feedback.into(),
            score,
        }
    }
}

/// Feedback for a named parameter of a `PromptModel`.
#[derive(Debug, Clone, PartialEq)]
pub struct Feedback {
    pub feedback: String,
    pub score: f32,
}

/// One (prompt, output, evaluation) triple from a forward pass.
#[derive(Debug, Clone)]
pub struct ForwardRecord {
    pub prompt: Prompt,
    pub input: InputRow,
    pub content: String,
    pub evaluation: EvaluationResult,
    /// Persistence id of the stored output, when a store is attached.
    pub output_id: Option<String>,
}

/// One simulated trial of a candidate prompt.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub input: InputRow,
    pub content: String,
    pub evaluation: EvaluationResult,
}

#[derive(Debug, Clone)]
pub struct ScoredPrompt {
    pub prompt: Prompt,
    pub average_score: f32,
    pub simulations: Vec<SimulationResult>,
}

/// Outcome of `Archer::run_training_loop`.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub cycles_run: usize,
    pub successful_backward_passes: usize,
    pub final_generation: u32,
    pub best_prompt: Option<Prompt>,
}
