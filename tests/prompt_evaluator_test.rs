// tests/prompt_evaluator_test.rs — Integration test: simulation averaging and selection

mod common;

use std::sync::Arc;

use archer::core::generator::Generator;
use archer::core::prompt::Prompt;
use archer::core::types::InputRow;
use archer::evaluator::prompt_evaluator::PromptEvaluator;
use archer::evaluator::Evaluator;
use archer::infra::config::{EvaluatorConfig, GeneratorConfig};
use archer::provider::ModelProvider;
use common::*;

fn prompt_evaluator(generator: Arc<dyn ModelProvider>, judge: Arc<dyn ModelProvider>) -> PromptEvaluator {
    PromptEvaluator::new(
        Generator::new(generator, GeneratorConfig::default()),
        Arc::new(Evaluator::new(judge, EvaluatorConfig::default())),
    )
}

#[tokio::test]
async fn test_average_over_simulations() {
    let generator = Arc::new(ScriptedProvider::new(improving_handler));
    let judge = Arc::new(SequencedProvider::new([
        eval_json(2.0, "weak"),
        eval_json(3.0, "fine"),
        eval_json(5.0, "great"),
    ]));
    let mut pe = prompt_evaluator(generator.clone(), judge.clone());
    let inputs = vec![InputRow::text("one"), InputRow::text("two")];

    let scored = pe.evaluate_prompts(&[Prompt::new("Summarize.")], &inputs, 3).await;

    assert_eq!(scored.len(), 1);
    assert_eq!(scored[0].simulations.len(), 3);
    assert!((scored[0].average_score - 10.0 / 3.0).abs() < 1e-4);
    // trials cycle through the inputs
    assert_eq!(scored[0].simulations[2].input, InputRow::text("one"));
    assert_eq!(judge.calls(), 3);
}

#[tokio::test]
async fn test_empty_prompt_list_makes_no_calls() {
    let generator = Arc::new(ScriptedProvider::new(improving_handler));
    let judge = Arc::new(ScriptedProvider::new(improving_handler));
    let mut pe = prompt_evaluator(generator.clone(), judge.clone());

    let inputs = vec![InputRow::text("x")];
    assert!(pe.evaluate_prompts(&[], &inputs, 3).await.is_empty());
    assert!(pe.evaluate_and_select_best(&[], &inputs, 3, 0.5).await.is_empty());
    assert_eq!(generator.total() + judge.total(), 0);
}

#[tokio::test]
async fn test_failed_generations_do_not_count() {
    let generator = Arc::new(FailingProvider::new());
    let judge = Arc::new(ScriptedProvider::new(improving_handler));
    let mut pe = prompt_evaluator(generator.clone(), judge.clone());

    let scored = pe
        .evaluate_prompts(&[Prompt::new("Summarize.")], &[InputRow::text("x")], 2)
        .await;

    assert_eq!(scored[0].average_score, 0.0);
    assert!(scored[0].simulations.is_empty());
    assert_eq!(generator.calls(), 2);
    assert_eq!(judge.total(), 0);
}

#[tokio::test]
async fn test_select_best_keeps_top_quantile() {
    let provider = Arc::new(ScriptedProvider::new(improving_handler));
    let mut pe = prompt_evaluator(provider.clone(), provider.clone());
    let prompts = vec![
        Prompt::new("Plain one"),
        Prompt::new("Rewritten one"),
        Prompt::new("Plain two"),
        Prompt::new("Rewritten two"),
    ];

    let best = pe
        .evaluate_and_select_best(&prompts, &[InputRow::text("x")], 1, 0.5)
        .await;

    let contents: Vec<&str> = best.iter().map(|p| p.content()).collect();
    assert_eq!(contents, vec!["Rewritten one", "Rewritten two"]);
    assert!(best.iter().all(|p| p.score == 5.0));
    assert_eq!(best[0].feedback, "clear and specific");
}
