// tests/optimizer_test.rs — Integration test: rewrites, variants and backends

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use archer::core::prompt::Prompt;
use archer::core::types::PromptFeedback;
use archer::infra::config::OptimizerConfig;
use archer::infra::errors::ArcherError;
use archer::optimizer::PromptOptimizer;
use archer::provider::ChatRequest;
use common::*;

fn current_prompt(request: &ChatRequest) -> &str {
    section(request, "## Current prompt\n")
}

#[tokio::test]
async fn test_guidance_and_temperature_follow_score() {
    let provider = Arc::new(ScriptedProvider::new(improving_handler));
    let optimizer = PromptOptimizer::new(provider.clone(), OptimizerConfig::default()).unwrap();
    let batch = vec![
        PromptFeedback::new(Prompt::new("Low scorer"), "misses the point", 2.0),
        PromptFeedback::new(Prompt::new("High scorer"), "nearly there", 4.5),
    ];

    let pool = optimizer.optimize(&batch).await;

    let rewrites = provider.requests_of(Kind::Rewrite);
    assert_eq!(rewrites.len(), 2);
    let low = rewrites.iter().find(|r| current_prompt(r) == "Low scorer").unwrap();
    let high = rewrites.iter().find(|r| current_prompt(r) == "High scorer").unwrap();
    assert!(low.text().contains("significant rewrite"));
    assert!(low.text().contains("misses the point"));
    assert!(high.text().contains("minor refinement"));
    assert!(low.temperature.unwrap() > high.temperature.unwrap());

    // rewrites first, then the parents they came from
    assert_eq!(pool[0].content(), "Rewritten Low scorer");
    assert_eq!(pool[1].content(), "Rewritten High scorer");
    assert_eq!(pool[2].content(), "Low scorer");
    assert_eq!(pool[3].content(), "High scorer");
    assert_eq!(pool[0].parent_id.as_deref(), Some(batch[0].prompt.id.as_str()));
}

#[tokio::test]
async fn test_variants_are_derived_one_per_slot() {
    let provider = Arc::new(ScriptedProvider::new(improving_handler));
    let optimizer = PromptOptimizer::new(provider.clone(), OptimizerConfig::default()).unwrap();
    let base = Prompt::new("Answer briefly.");
    let traits = vec!["more concise".to_string(), "more formal".to_string()];

    let variants = optimizer
        .generate_prompt_variants(std::slice::from_ref(&base), &traits, 3, 2)
        .await;

    assert_eq!(variants.len(), 3);
    for v in &variants {
        assert_eq!(v.parent_id.as_deref(), Some(base.id.as_str()));
        assert_eq!(v.generation(), 1);
        assert!(v.content().starts_with("Variant"));
    }

    let requests = provider.requests_of(Kind::Variant);
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().any(|r| r.text().contains("more concise")));
    assert!(requests.iter().any(|r| r.text().contains("more formal")));
}

#[tokio::test]
async fn test_variants_give_up_after_retries() {
    let provider = Arc::new(FailingProvider::new());
    let optimizer = PromptOptimizer::new(provider.clone(), OptimizerConfig::default()).unwrap();
    let base = vec![Prompt::new("a"), Prompt::new("b")];

    let variants = optimizer.generate_prompt_variants(&base, &[], 2, 2).await;

    assert!(variants.is_empty());
    assert_eq!(provider.calls(), 2 * 2 * 2);
}

#[tokio::test]
async fn test_variant_attempts_stop_at_budget() {
    let provider = Arc::new(FailingProvider::new());
    let optimizer = PromptOptimizer::new(provider.clone(), OptimizerConfig::default()).unwrap();
    let base = vec![Prompt::new("a"), Prompt::new("b")];

    // 2 bases x 2 variants x 5 retries would be 20 calls
    let variants = optimizer.generate_prompt_variants(&base, &[], 2, 5).await;

    assert!(variants.is_empty());
    assert_eq!(provider.calls(), 2 * 2 * 2);
}

// ─── Deadlines ──────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_rewrite_timeout_keeps_original() {
    let provider = Arc::new(ScriptedProvider::new(improving_handler).with_delay(Duration::from_secs(600)));
    let optimizer = PromptOptimizer::new(provider.clone(), OptimizerConfig::default()).unwrap();
    let prompt = Prompt::new("Answer briefly.");
    let started = Instant::now();

    let text = optimizer.optimize_prompt(&prompt, "too long", 2.0).await;

    assert_eq!(text, "Answer briefly.");
    assert_eq!(provider.count(Kind::Rewrite), 1);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(60));
    assert!(elapsed < Duration::from_secs(600));
}

#[tokio::test(start_paused = true)]
async fn test_slow_variant_retried_then_dropped() {
    let provider = Arc::new(ScriptedProvider::new(improving_handler).with_delay(Duration::from_secs(600)));
    let optimizer = PromptOptimizer::new(provider.clone(), OptimizerConfig::default()).unwrap();
    let base = Prompt::new("Answer briefly.");
    let started = Instant::now();

    let variants = optimizer
        .generate_prompt_variants(std::slice::from_ref(&base), &[], 1, 2)
        .await;

    assert!(variants.is_empty());
    let requests = provider.requests_of(Kind::Variant);
    assert_eq!(requests.len(), 2);
    // each retry runs warmer
    assert!(requests[1].temperature.unwrap() > requests[0].temperature.unwrap());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(2 * 30));
    assert!(elapsed < Duration::from_secs(600));
}

#[tokio::test(start_paused = true)]
async fn test_variant_phase_timeout_keeps_rewrites_and_parents() {
    let provider = Arc::new(
        ScriptedProvider::new(improving_handler).with_delay_for(Kind::Variant, Duration::from_secs(600)),
    );
    let mut config = OptimizerConfig::default();
    config.num_variants = 1;
    config.max_retries = 3;
    config.variant_timeout_secs = 30;
    config.variant_phase_timeout_secs = 45;
    let optimizer = PromptOptimizer::new(provider.clone(), config).unwrap();
    let batch = vec![PromptFeedback::new(Prompt::new("Draft a reply."), "too generic", 2.5)];

    let pool = optimizer.optimize(&batch).await;

    let contents: Vec<&str> = pool.iter().map(|p| p.content()).collect();
    assert_eq!(contents, vec!["Rewritten Draft a reply.", "Draft a reply."]);
    // the second attempt was cut off by the phase deadline, the third never started
    assert_eq!(provider.count(Kind::Variant), 2);
}

#[tokio::test]
async fn test_gradient_backend_passes_critique_to_rewrite() {
    let provider = Arc::new(ScriptedProvider::new(improving_handler));
    let mut config = OptimizerConfig::default();
    config.gradient_enabled = true;
    config.num_variants = 1;
    let optimizer = PromptOptimizer::new(provider.clone(), config).unwrap();
    let batch = vec![PromptFeedback::new(Prompt::new("Draft a reply."), "too generic", 2.5)];

    let pool = optimizer.optimize(&batch).await;

    assert_eq!(provider.count(Kind::Critique), 1);
    let rewrite = &provider.requests_of(Kind::Rewrite)[0];
    assert!(rewrite.text().contains("## Critique\nName the audience"));
    assert_eq!(pool[0].content(), "Rewritten Draft a reply.");
    assert_eq!(pool[1].content(), "Draft a reply.");
    assert_eq!(pool.len(), 3);
}

#[tokio::test]
async fn test_gradient_failure_falls_back_to_standard() {
    let provider = Arc::new(ScriptedProvider::new(|kind, request| match kind {
        Kind::Critique => Err(ArcherError::Timeout {
            operation: "backward".into(),
            seconds: 60,
        }),
        _ => improving_handler(kind, request),
    }));
    let mut config = OptimizerConfig::default();
    config.gradient_enabled = true;
    let optimizer = PromptOptimizer::new(provider.clone(), config).unwrap();
    let batch = vec![PromptFeedback::new(Prompt::new("Draft a reply."), "too generic", 2.5)];

    let pool = optimizer.optimize(&batch).await;

    assert_eq!(pool[0].content(), "Rewritten Draft a reply.");
    let rewrites = provider.requests_of(Kind::Rewrite);
    assert_eq!(rewrites.len(), 1);
    assert!(!rewrites[0].text().contains("## Critique"));
}
