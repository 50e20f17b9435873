// src/core/tracker.rs — Per-generation performance history

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::prompt::Prompt;
use super::types::ForwardRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptPerformance {
    pub id: String,
    pub generation: u32,
    pub average_score: f32,
    pub evaluations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSnapshot {
    pub generation: u32,
    pub recorded_at: DateTime<Utc>,
    pub prompts: Vec<PromptPerformance>,
    pub best_score: f32,
    pub mean_score: f32,
}

/// Collects one snapshot per forward pass. Export is JSON for outside charting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceTracker {
    snapshots: Vec<GenerationSnapshot>,
    rounds_survived: HashMap<String, u32>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot `generation`: one entry per active prompt in population
    /// order, then any other prompt seen in `records`. Prompts without
    /// records show 0 evaluations; best and mean cover evaluated prompts only.
    pub fn record_generation(
        &mut self,
        generation: u32,
        population: &[Prompt],
        records: &[ForwardRecord],
    ) -> &GenerationSnapshot {
        let mut order: Vec<(&str, u32)> = population
            .iter()
            .map(|p| (p.id.as_str(), p.generation()))
            .collect();
        let mut totals: BTreeMap<&str, (f32, usize)> = BTreeMap::new();
        for r in records {
            let id = r.prompt.id.as_str();
            if !order.iter().any(|(known, _)| *known == id) {
                order.push((id, r.prompt.generation()));
            }
            let entry = totals.entry(id).or_insert((0.0, 0));
            entry.0 += r.evaluation.score;
            entry.1 += 1;
        }

        let prompts: Vec<PromptPerformance> = order
            .into_iter()
            .map(|(id, g)| {
                let (sum, n) = totals.get(id).copied().unwrap_or((0.0, 0));
                PromptPerformance {
                    id: id.to_string(),
                    generation: g,
                    average_score: if n == 0 { 0.0 } else { sum / n as f32 },
                    evaluations: n,
                }
            })
            .collect();

        let evaluated: Vec<f32> = prompts
            .iter()
            .filter(|p| p.evaluations > 0)
            .map(|p| p.average_score)
            .collect();
        let best_score = evaluated.iter().copied().fold(0.0, f32::max);
        let mean_score = if evaluated.is_empty() {
            0.0
        } else {
            evaluated.iter().sum::<f32>() / evaluated.len() as f32
        };

        tracing::info!(generation, prompts = prompts.len(), best_score, mean_score, "Generation recorded");
        self.snapshots.push(GenerationSnapshot {
            generation,
            recorded_at: Utc::now(),
            prompts,
            best_score,
            mean_score,
        });
        &self.snapshots[self.snapshots.len() - 1]
    }

    /// Count one more survived selection round for each id; forget the rest.
    pub fn record_survivors<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        let mut next = HashMap::new();
        for id in ids {
            let rounds = self.rounds_survived.get(id).copied().unwrap_or(0) + 1;
            next.insert(id.to_string(), rounds);
        }
        self.rounds_survived = next;
    }

    pub fn rounds_survived(&self, id: &str) -> u32 {
        self.rounds_survived.get(id).copied().unwrap_or(0)
    }

    pub fn snapshots(&self) -> &[GenerationSnapshot] {
        &self.snapshots
    }

    pub fn latest(&self) -> Option<&GenerationSnapshot> {
        self.snapshots.last()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.snapshots)
    }
}
