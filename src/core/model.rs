// src/core/model.rs — Named prompt collection optimized in place

use std::collections::BTreeMap;

use super::prompt::Prompt;

/// Heuristic "gradient" attached to a parameter before a backward step.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub score: f32,
    pub feedback: String,
    pub magnitude: f32,
    pub traits: Vec<String>,
    /// Textual critique produced by the backward step.
    pub critique: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Parameter {
    pub prompt: Prompt,
    pub requires_grad: bool,
    pub gradient: Option<Gradient>,
}

impl Parameter {
    pub fn new(prompt: Prompt) -> Self {
        Self {
            prompt,
            requires_grad: true,
            gradient: None,
        }
    }

    /// A parameter the optimizer must leave alone.
    pub fn frozen(prompt: Prompt) -> Self {
        Self {
            requires_grad: false,
            ..Self::new(prompt)
        }
    }
}

/// id → parameter. Ids are caller-chosen names, never list positions.
#[derive(Debug, Clone, Default)]
pub struct PromptModel {
    params: BTreeMap<String, Parameter>,
}

impl PromptModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model keyed by each prompt's own id.
    pub fn from_prompts(prompts: impl IntoIterator<Item = Prompt>) -> Self {
        let mut model = Self::new();
        for p in prompts {
            model.insert(p.id.clone(), Parameter::new(p));
        }
        model
    }

    pub fn insert(&mut self, id: impl Into<String>, param: Parameter) {
        self.params.insert(id.into(), param);
    }

    pub fn get(&self, id: &str) -> Option<&Parameter> {
        self.params.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Parameter> {
        self.params.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Ids of parameters the optimizer may rewrite.
    pub fn trainable_ids(&self) -> Vec<String> {
        self.params
            .iter()
            .filter(|(_, p)| p.requires_grad)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Parameter)> {
        self.params.iter()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.params.values().map(|p| p.prompt.clone()).collect()
    }

    pub fn clear_gradients(&mut self) {
        for p in self.params.values_mut() {
            p.gradient = None;
        }
    }
}
