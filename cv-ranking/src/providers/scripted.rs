//! Deterministic provider that replays scripted responses

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::traits::{CompletionRequest, CompletionResponse, LLMProvider, ProviderError, ProviderResult};
use crate::runner::rate_limiter::RateLimiter;

type Responder = Box<dyn Fn(&str) -> ProviderResult<String> + Send + Sync>;

enum Step {
    Text(String),
    Error(ProviderError),
}

/// Provider that answers from a queue of scripted steps, then from an
/// optional prompt-based responder. Every prompt it receives is recorded.
///
/// Token usage is the whitespace-separated word count of prompt and reply.
pub struct ScriptedProvider {
    name: String,
    default_model: String,
    steps: Mutex<VecDeque<Step>>,
    responder: Option<Responder>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    latency: Option<Duration>,
    rate_limiter: Arc<RateLimiter>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_model: "scripted-model".to_string(),
            steps: Mutex::new(VecDeque::new()),
            responder: None,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            latency: None,
            rate_limiter: Arc::new(RateLimiter::new(0, 0)),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Queue a successful response
    pub fn then_text(self, text: impl Into<String>) -> Self {
        lock(&self.steps).push_back(Step::Text(text.into()));
        self
    }

    /// Queue a failure
    pub fn then_error(self, error: ProviderError) -> Self {
        lock(&self.steps).push_back(Step::Error(error));
        self
    }

    /// Answer from the prompt once the queue is empty
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&str) -> ProviderResult<String> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Fail every call once the queue is empty
    pub fn with_fallback_error<F>(self, error: F) -> Self
    where
        F: Fn() -> ProviderError + Send + Sync + 'static,
    {
        self.with_responder(move |_| Err(error()))
    }

    /// Delay every response
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        lock(&self.prompts).clone()
    }

    fn next_reply(&self, prompt: &str) -> ProviderResult<String> {
        match lock(&self.steps).pop_front() {
            Some(Step::Text(text)) => Ok(text),
            Some(Step::Error(error)) => Err(error),
            None => match &self.responder {
                Some(responder) => responder(prompt),
                None => Err(ProviderError::InvalidResponse("script exhausted".to_string())),
            },
        }
    }
}

fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
        self.rate_limiter.acquire_for(request.estimated_tokens()).await;

        let prompt = request.prompt().to_string();
        lock(&self.prompts).push(prompt.clone());
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let content = self.next_reply(&prompt)?;
        let (input_tokens, output_tokens) = (word_count(&prompt), word_count(&content));
        self.rate_limiter.record_tokens(input_tokens + output_tokens).await;

        Ok(CompletionResponse {
            input_tokens,
            output_tokens,
            content,
            model: request.model.clone().unwrap_or_else(|| self.default_model.clone()),
            finish_reason: "stop".to_string(),
            latency_ms: self.latency.map_or(0, |l| l.as_millis() as u64),
        })
    }

    fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }
}
