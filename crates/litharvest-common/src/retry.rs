//! Retry policy for throttled requests.

use reqwest::StatusCode;
use std::time::Duration;

/// Default attempt budget per request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default backoff base (0.5 s).
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// How many times a request is tried and how long to wait between tries.
///
/// Backoff is exponential: after the failed attempt with 0-based index `i`
/// the client waits `backoff_base * 2^i`, so retry `k` (1-based) waits
/// `backoff_base * 2^(k-1)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_base: Duration,
    retryable: fn(StatusCode) -> bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
            retryable: is_throttle_status,
        }
    }

    /// Replace the retryable-status predicate.
    pub fn with_retryable(mut self, predicate: fn(StatusCode) -> bool) -> Self {
        self.retryable = predicate;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    pub fn is_retryable(&self, status: StatusCode) -> bool {
        (self.retryable)(status)
    }

    /// Wait after the failed attempt with 0-based index `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Whether another attempt follows the failed attempt `attempt` (0-based).
    pub fn has_attempt_after(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }

    /// Every wait a fully throttled request goes through, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts.saturating_sub(1))
            .map(|i| self.backoff(i))
            .collect()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF_BASE)
    }
}

/// 429 Too Many Requests and 403 Forbidden are treated as throttling.
pub fn is_throttle_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN
}
