//! Client-side sliding-window rate limiting per provider

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(60);

/// Requests-per-minute and tokens-per-minute limiter over a one minute window.
///
/// A limit of zero disables that dimension.
pub struct RateLimiter {
    requests_per_minute: u32,
    tokens_per_minute: u32,
    requests: Mutex<VecDeque<Instant>>,
    token_usage: Mutex<VecDeque<(Instant, u32)>>,
}

fn prune<T>(entries: &mut VecDeque<T>, now: Instant, at: impl Fn(&T) -> Instant) {
    while let Some(front) = entries.front() {
        if now.duration_since(at(front)) > WINDOW {
            entries.pop_front();
        } else {
            break;
        }
    }
}

impl RateLimiter {
    pub fn new(requests_per_minute: u32, tokens_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            tokens_per_minute,
            requests: Mutex::new(VecDeque::new()),
            token_usage: Mutex::new(VecDeque::new()),
        }
    }

    pub fn requests_per_minute(&self) -> u32 {
        self.requests_per_minute
    }

    /// Wait until a request fits in the window, then claim the slot
    pub async fn acquire(&self) {
        loop {
            match self.try_claim().await {
                None => return,
                Some(wait) => {
                    tracing::debug!("Request window full, waiting {}ms", wait.as_millis());
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Wait for room in both the token and the request window
    pub async fn acquire_for(&self, estimated_tokens: u32) {
        self.wait_for_token_capacity(estimated_tokens).await;
        self.acquire().await;
    }

    /// Claim a slot, or return how long until the oldest request leaves the window
    async fn try_claim(&self) -> Option<Duration> {
        let mut requests = self.requests.lock().await;
        let now = Instant::now();
        prune(&mut requests, now, |t| *t);

        if self.requests_per_minute > 0 && requests.len() >= self.requests_per_minute as usize {
            if let Some(&oldest) = requests.front() {
                let elapsed = now.duration_since(oldest);
                return Some(WINDOW.saturating_sub(elapsed) + Duration::from_millis(10));
            }
        }

        requests.push_back(now);
        None
    }

    /// Record token usage of a completed call
    pub async fn record_tokens(&self, tokens: u32) {
        let mut usage = self.token_usage.lock().await;
        let now = Instant::now();
        prune(&mut usage, now, |(t, _)| *t);
        usage.push_back((now, tokens));
    }

    /// Tokens used in the last minute
    pub async fn current_token_usage(&self) -> u32 {
        let mut usage = self.token_usage.lock().await;
        prune(&mut usage, Instant::now(), |(t, _)| *t);
        usage.iter().map(|(_, t)| t).sum()
    }

    pub async fn has_token_capacity(&self, needed: u32) -> bool {
        if self.tokens_per_minute == 0 {
            return true;
        }
        self.current_token_usage().await.saturating_add(needed) <= self.tokens_per_minute
    }

    /// Wait until `needed` tokens fit in the window.
    ///
    /// Requests larger than the whole budget only wait for an empty window.
    pub async fn wait_for_token_capacity(&self, needed: u32) {
        let needed = needed.min(self.tokens_per_minute);
        while !self.has_token_capacity(needed).await {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_basic() {
        let limiter = RateLimiter::new(5, 1000);

        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(limiter.try_claim().await.is_some());
    }

    #[tokio::test]
    async fn test_zero_rpm_is_unlimited() {
        let limiter = RateLimiter::new(0, 0);
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert!(limiter.has_token_capacity(u32::MAX).await);
    }

    #[tokio::test]
    async fn test_token_recording() {
        let limiter = RateLimiter::new(60, 1000);

        limiter.record_tokens(100).await;
        limiter.record_tokens(200).await;

        assert_eq!(limiter.current_token_usage().await, 300);
        assert!(limiter.has_token_capacity(700).await);
        assert!(!limiter.has_token_capacity(701).await);
    }

    #[tokio::test]
    async fn test_acquire_for_waits_on_token_budget() {
        let limiter = RateLimiter::new(0, 1000);
        limiter.record_tokens(900).await;

        let blocked = tokio::time::timeout(Duration::from_millis(250), limiter.acquire_for(200)).await;
        assert!(blocked.is_err());

        let admitted = tokio::time::timeout(Duration::from_millis(250), limiter.acquire_for(100)).await;
        assert!(admitted.is_ok());
    }

    #[tokio::test]
    async fn test_oversized_request_waits_only_for_empty_window() {
        let limiter = RateLimiter::new(0, 1000);
        let admitted = tokio::time::timeout(Duration::from_millis(250), limiter.acquire_for(5000)).await;
        assert!(admitted.is_ok());
    }
}
