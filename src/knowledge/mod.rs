// src/knowledge/mod.rs — Reference documents for the evaluator

pub mod loader;

use crate::util::take_chars;

/// Loaded reference documents, in load order.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    documents: Vec<String>,
}

impl KnowledgeBase {
    pub fn new(documents: Vec<String>) -> Self {
        Self { documents }
    }

    pub fn load(dirs: &[String]) -> Self {
        Self::new(loader::load_documents(dirs))
    }

    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Documents joined with separators, cut to `max_chars` characters.
    pub fn render(&self, max_chars: usize) -> String {
        let joined = self
            .documents
            .iter()
            .map(|d| d.trim())
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");
        take_chars(&joined, max_chars).to_string()
    }
}
