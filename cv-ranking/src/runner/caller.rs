//! Provider calls with retry, backoff, per-call timeout and run-level stop

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::sleep;

use crate::providers::{
    CompletionRequest, CompletionResponse, GenerationOptions, LLMProvider, ProviderError,
    ProviderResult,
};
use crate::store::CallStats;

/// Retry and timeout settings for every call in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub timeout_ms: u64,
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 60_000,
            timeout_ms: 120_000,
        }
    }
}

/// Shared stop conditions: external cancellation, a run deadline, or a fatal
/// provider error. Once stopped, no new calls are issued.
#[derive(Debug)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
    fatal: OnceLock<String>,
}

impl RunControl {
    pub fn new(cancelled: Arc<AtomicBool>, deadline: Option<Duration>) -> Self {
        Self {
            cancelled,
            deadline: deadline.map(|d| Instant::now() + d),
            fatal: OnceLock::new(),
        }
    }

    /// Never stops unless cancelled through [`RunControl::cancel`]
    pub fn unbounded() -> Self {
        Self::new(Arc::new(AtomicBool::new(false)), None)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Record the first fatal error; later ones are dropped
    pub fn trip_fatal(&self, message: impl Into<String>) {
        let _ = self.fatal.set(message.into());
    }

    pub fn fatal_error(&self) -> Option<&str> {
        self.fatal.get().map(String::as_str)
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left before the deadline, if one is set
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    pub fn stop_reason(&self) -> Option<String> {
        if let Some(message) = self.fatal_error() {
            return Some(format!("run aborted after fatal error: {}", message));
        }
        if self.cancelled.load(Ordering::SeqCst) {
            return Some("run cancelled".to_string());
        }
        if self.deadline_exceeded() {
            return Some("run deadline exceeded".to_string());
        }
        None
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_reason().is_some()
    }
}

/// Issues prompts for one (provider, model) combination.
///
/// The semaphore is shared by every caller of a run and bounds in-flight
/// provider calls; a permit is held only while a request is outstanding.
#[derive(Clone)]
pub struct ProviderCaller {
    provider: Arc<dyn LLMProvider>,
    options: GenerationOptions,
    policy: CallPolicy,
    semaphore: Arc<Semaphore>,
    control: Arc<RunControl>,
    stats: Arc<CallStats>,
}

impl ProviderCaller {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        options: GenerationOptions,
        policy: CallPolicy,
        semaphore: Arc<Semaphore>,
        control: Arc<RunControl>,
        stats: Arc<CallStats>,
    ) -> Self {
        Self {
            provider,
            options,
            policy,
            semaphore,
            control,
            stats,
        }
    }

    /// A caller with its own semaphore, controls and counters
    pub fn standalone(provider: Arc<dyn LLMProvider>, options: GenerationOptions, policy: CallPolicy) -> Self {
        Self::new(
            provider,
            options,
            policy,
            Arc::new(Semaphore::new(1)),
            Arc::new(RunControl::unbounded()),
            Arc::new(CallStats::new()),
        )
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.options.model_id
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    pub fn control(&self) -> &Arc<RunControl> {
        &self.control
    }

    fn cancelled(&self) -> Option<ProviderError> {
        self.control.stop_reason().map(ProviderError::Cancelled)
    }

    /// Send a prompt, retrying transient failures with exponential backoff.
    ///
    /// Rate limits wait at least the server's `retry_after_ms`. Fatal errors
    /// stop the whole run. Returns `Cancelled` once the run is stopped.
    pub async fn generate(&self, prompt: &str) -> ProviderResult<CompletionResponse> {
        let request = CompletionRequest::from_prompt(prompt, &self.options);
        let mut delay = self.policy.retry_delay_ms;

        for attempt in 0..=self.policy.retry_count {
            if let Some(stopped) = self.cancelled() {
                return Err(stopped);
            }

            let error = match self.attempt(&request).await {
                Ok(response) => {
                    tracing::debug!(
                        "{}/{}: {} chars, {} in / {} out tokens, {}ms",
                        self.provider_name(),
                        self.model(),
                        response.content.len(),
                        response.input_tokens,
                        response.output_tokens,
                        response.latency_ms
                    );
                    self.stats.record_success(response.usage());
                    return Ok(response);
                }
                Err(e @ ProviderError::Cancelled(_)) => return Err(e),
                Err(e) => e,
            };

            self.stats.record_failure();

            if error.is_fatal() {
                tracing::error!("Fatal error from {}: {}", self.provider_name(), error);
                self.control
                    .trip_fatal(format!("{}: {}", self.provider_name(), error));
                return Err(error);
            }
            if !error.is_transient() || attempt == self.policy.retry_count {
                return Err(error);
            }

            let wait = match &error {
                ProviderError::RateLimited { retry_after_ms } => {
                    tracing::warn!(
                        "Rate limited on {}/{}, waiting {}ms",
                        self.provider_name(),
                        self.model(),
                        retry_after_ms
                    );
                    (*retry_after_ms).max(delay)
                }
                other => {
                    tracing::warn!(
                        "Retry {} of {} on {}/{} in {}ms: {}",
                        attempt + 1,
                        self.policy.retry_count,
                        self.provider_name(),
                        self.model(),
                        delay,
                        other
                    );
                    delay
                }
            };

            // Never sleep past the deadline
            let wait = Duration::from_millis(wait);
            sleep(self.control.remaining().map_or(wait, |left| wait.min(left))).await;
            delay = (delay * 2).min(self.policy.max_retry_delay_ms);
        }

        Err(self
            .cancelled()
            .unwrap_or_else(|| ProviderError::Cancelled("retries exhausted".to_string())))
    }

    /// One request under a semaphore permit and the per-call timeout
    async fn attempt(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ProviderError::Cancelled("call limiter closed".to_string()))?;

        // Waiting for a permit may have outlasted the run
        if let Some(stopped) = self.cancelled() {
            return Err(stopped);
        }

        let per_call = Duration::from_millis(self.policy.timeout_ms);
        let (timeout, deadline_bound) = match self.control.remaining() {
            Some(left) if left < per_call => (left, true),
            _ => (per_call, false),
        };

        match tokio::time::timeout(timeout, self.provider.complete(request)).await {
            Ok(result) => result,
            Err(_) if deadline_bound => Err(ProviderError::Cancelled("run deadline exceeded".to_string())),
            Err(_) => Err(ProviderError::Timeout {
                timeout_ms: self.policy.timeout_ms,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedProvider;

    fn policy(retry_count: u32) -> CallPolicy {
        CallPolicy {
            retry_count,
            retry_delay_ms: 1,
            max_retry_delay_ms: 4,
            timeout_ms: 1_000,
        }
    }

    fn caller(provider: Arc<ScriptedProvider>, retry_count: u32) -> ProviderCaller {
        ProviderCaller::standalone(provider, GenerationOptions::new("test-model"), policy(retry_count))
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let provider = Arc::new(
            ScriptedProvider::new("scripted")
                .then_error(ProviderError::Timeout { timeout_ms: 1 })
                .then_error(ProviderError::Api { status: 503, message: "busy".into() })
                .then_text("ok"),
        );
        let caller = caller(Arc::clone(&provider), 3);

        let response = caller.generate("hello").await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(provider.call_count(), 3);
        assert_eq!(caller.stats.calls(), 3);
        assert_eq!(caller.stats.failed_calls(), 2);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let provider = Arc::new(
            ScriptedProvider::new("scripted").with_fallback_error(|| ProviderError::Timeout { timeout_ms: 1 }),
        );
        let caller = caller(Arc::clone(&provider), 2);

        let err = caller.generate("hello").await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let provider = Arc::new(
            ScriptedProvider::new("scripted")
                .then_error(ProviderError::InvalidResponse("garbage".into()))
                .then_text("never reached"),
        );
        let caller = caller(Arc::clone(&provider), 3);

        assert!(caller.generate("hello").await.is_err());
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_later_calls() {
        let provider = Arc::new(
            ScriptedProvider::new("scripted")
                .then_error(ProviderError::Auth("bad key".into()))
                .then_text("never reached"),
        );
        let caller = caller(Arc::clone(&provider), 3);

        assert!(matches!(caller.generate("a").await, Err(ProviderError::Auth(_))));
        assert!(caller.control().fatal_error().is_some());
        assert!(matches!(caller.generate("b").await, Err(ProviderError::Cancelled(_))));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_run_issues_no_calls() {
        let provider = Arc::new(ScriptedProvider::new("scripted").then_text("ok"));
        let caller = caller(Arc::clone(&provider), 0);
        caller.control().cancel();

        assert!(matches!(caller.generate("a").await, Err(ProviderError::Cancelled(_))));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let provider = Arc::new(
            ScriptedProvider::new("scripted")
                .with_latency(Duration::from_millis(200))
                .then_text("late"),
        );
        let caller = ProviderCaller::standalone(
            provider,
            GenerationOptions::new("test-model"),
            CallPolicy {
                timeout_ms: 10,
                ..policy(0)
            },
        );

        let err = caller.generate("a").await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { timeout_ms: 10 }));
    }
}
