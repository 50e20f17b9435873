// tests/common/mod.rs — Mock model providers shared by integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use archer::infra::config::Config;
use archer::infra::errors::ArcherError;
use archer::provider::{ChatRequest, ChatResponse, ModelProvider, Role};

/// Which component sent a request, told apart by the text each one writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Generate,
    Evaluate,
    Rewrite,
    Variant,
    Critique,
}

pub fn classify(request: &ChatRequest) -> Kind {
    let system = message(request, Role::System);
    let user = message(request, Role::User);
    if system.starts_with("You are a strict evaluator") {
        Kind::Evaluate
    } else if system.starts_with("You diagnose") {
        Kind::Critique
    } else if user.starts_with("Guidance:") {
        Kind::Rewrite
    } else if user.starts_with("Write a variant") {
        Kind::Variant
    } else {
        Kind::Generate
    }
}

pub fn message(request: &ChatRequest, role: Role) -> &str {
    request
        .messages
        .iter()
        .find(|m| m.role == role)
        .map(|m| m.content.as_str())
        .unwrap_or("")
}

/// Text after `marker` in the user message, e.g. the prompt under rewrite.
pub fn section<'a>(request: &'a ChatRequest, marker: &str) -> &'a str {
    let user = message(request, Role::User);
    user.split_once(marker).map(|(_, rest)| rest).unwrap_or("")
}

pub fn eval_json(score: f32, feedback: &str) -> String {
    serde_json::json!({
        "score": score,
        "feedback": feedback,
        "improved_output": "a better answer",
        "summary": "ok",
    })
    .to_string()
}

fn provider_error(message: &str) -> ArcherError {
    ArcherError::Provider {
        provider: "mock".into(),
        message: message.into(),
        retriable: true,
    }
}

type Handler = Box<dyn Fn(Kind, &ChatRequest) -> Result<String, ArcherError> + Send + Sync>;

/// Answers each request through a handler and records it. An optional delay
/// makes every call slow.
pub struct ScriptedProvider {
    handler: Handler,
    delay: Option<Duration>,
    slow_kind: Option<Kind>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    pub fn new(
        handler: impl Fn(Kind, &ChatRequest) -> Result<String, ArcherError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            delay: None,
            slow_kind: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Delay only requests of `kind`; everything else answers at once.
    pub fn with_delay_for(mut self, kind: Kind, delay: Duration) -> Self {
        self.delay = Some(delay);
        self.slow_kind = Some(kind);
        self
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_of(&self, kind: Kind) -> Vec<ChatRequest> {
        self.requests()
            .into_iter()
            .filter(|r| classify(r) == kind)
            .collect()
    }

    pub fn count(&self, kind: Kind) -> usize {
        self.requests_of(kind).len()
    }

    pub fn total(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ArcherError> {
        self.requests.lock().unwrap().push(request.clone());
        let kind = classify(&request);
        if let Some(delay) = self.delay {
            if self.slow_kind.map_or(true, |slow| slow == kind) {
                tokio::time::sleep(delay).await;
            }
        }
        (self.handler)(kind, &request).map(ChatResponse::text)
    }
}

/// Echoes prompts as output, scores outputs starting with "Rewritten" at 5
/// and everything else at 2, and answers rewrites and variants by prefixing
/// the prompt they were given.
pub fn improving_handler(kind: Kind, request: &ChatRequest) -> Result<String, ArcherError> {
    match kind {
        Kind::Generate => Ok(message(request, Role::System).to_string()),
        Kind::Evaluate => {
            let response = section(request, "## Response to evaluate\n");
            if response.starts_with("Rewritten") {
                Ok(eval_json(5.0, "clear and specific"))
            } else {
                Ok(eval_json(2.0, "too vague"))
            }
        }
        Kind::Rewrite => Ok(format!("Rewritten {}", section(request, "## Current prompt\n"))),
        Kind::Variant => {
            let temperature = request.temperature.unwrap_or_default();
            Ok(format!(
                "Variant {temperature:.2} of {}",
                section(request, "## Prompt\n")
            ))
        }
        Kind::Critique => Ok("Name the audience and the output length.".into()),
    }
}

/// Like [`improving_handler`] but every optimizer call fails.
pub fn stuck_handler(kind: Kind, request: &ChatRequest) -> Result<String, ArcherError> {
    match kind {
        Kind::Rewrite | Kind::Variant | Kind::Critique => Err(provider_error("optimizer offline")),
        _ => improving_handler(kind, request),
    }
}

/// Pops canned responses in order; errors once the queue runs dry.
pub struct SequencedProvider {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<usize>,
}

impl SequencedProvider {
    pub fn new(responses: impl IntoIterator<Item = String>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ModelProvider for SequencedProvider {
    fn id(&self) -> &str {
        "sequenced"
    }

    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, ArcherError> {
        *self.calls.lock().unwrap() += 1;
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .map(ChatResponse::text)
            .ok_or_else(|| provider_error("script exhausted"))
    }
}

/// Every call fails.
pub struct FailingProvider {
    calls: Mutex<usize>,
}

impl FailingProvider {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ModelProvider for FailingProvider {
    fn id(&self) -> &str {
        "failing"
    }

    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, ArcherError> {
        *self.calls.lock().unwrap() += 1;
        Err(provider_error("connection refused"))
    }
}

/// Small, deterministic loop settings: two prompts kept, one simulation.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.archer.max_prompts_per_cycle = 2;
    config.archer.num_simulations = 1;
    config.archer.selection_quantile = 0.5;
    config.archer.error_threshold = 2;
    config.archer.recovery_secs = 60;
    config.storage.enabled = false;
    config
}
