// src/cli/train.rs — `archer train`: seed a population and run the loop

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Context};

use super::TrainArgs;
use crate::core::prompt::Prompt;
use crate::core::types::{InputSpec, TrainingSummary, INPUT_FIELD};
use crate::core::Archer;
use crate::infra::config::Config;
use crate::memory::Store;
use crate::provider::openai_compat::OpenAICompatProvider;
use crate::util::preview;

pub async fn run_train(config: &Config, args: TrainArgs) -> anyhow::Result<()> {
    let seeds = load_seeds(&args)?;
    if seeds.is_empty() {
        bail!("no seed prompts: pass --prompt or --prompts-file");
    }
    let input = build_input(&args);
    if input.expand().is_empty() {
        bail!("no inputs: pass --input or --field name=value");
    }

    let provider = Arc::new(OpenAICompatProvider::from_config(&config.provider)?);
    let mut archer = Archer::from_config(provider, config, seeds)?;

    if config.storage.enabled && !args.no_store {
        let db_path = config.storage.resolved_db_path();
        match Store::open(&db_path) {
            Ok(store) => {
                tracing::info!(path = %db_path.display(), "Recording to store");
                archer = archer.with_store(Arc::new(store));
            }
            Err(e) => tracing::warn!(path = %db_path.display(), error = %e, "Store unavailable, continuing in memory"),
        }
    }

    let summary = tokio::select! {
        summary = archer.run_training_loop(|_| input.clone(), args.cycles) => Some(summary),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, stopping after partial training");
            None
        }
    };

    match summary {
        Some(summary) => print_summary(&summary),
        None => {
            if let Some(best) = archer.best_prompt() {
                println!("Best prompt so far (score {:.2}):\n{}", best.score, best.content());
            }
        }
    }

    if let Some(path) = &args.history {
        let json = archer.tracker().to_json()?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("writing history to {path}"))?;
        println!("History written to {path}");
    }
    Ok(())
}

fn load_seeds(args: &TrainArgs) -> anyhow::Result<Vec<Prompt>> {
    let mut texts: Vec<String> = args.prompts.clone();
    if let Some(path) = &args.prompts_file {
        let content = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
        texts.extend(split_blocks(&content));
    }
    Ok(texts
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .map(Prompt::new)
        .collect())
}

/// Paragraphs separated by one or more blank lines.
fn split_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current.join("\n"));
    }
    blocks
}

fn build_input(args: &TrainArgs) -> InputSpec {
    let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
    if !args.inputs.is_empty() {
        fields.insert(INPUT_FIELD.to_string(), args.inputs.clone());
    }
    for (name, value) in &args.fields {
        fields.entry(name.clone()).or_default().push(value.clone());
    }
    fields
        .into_iter()
        .fold(InputSpec::new(args.mode.into()), |spec, (name, values)| spec.with_field(name, values))
}

fn print_summary(summary: &TrainingSummary) {
    println!(
        "{} cycles, {} successful backward passes, generation {}",
        summary.cycles_run, summary.successful_backward_passes, summary.final_generation
    );
    if let Some(best) = &summary.best_prompt {
        println!();
        println!("Best prompt (score {:.2}, id {}):", best.score, preview(&best.id, 8));
        println!("{}", best.content());
    }
}
