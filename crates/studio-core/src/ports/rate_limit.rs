//! Rate limiting port.

use async_trait::async_trait;

use crate::domain::{RoutePolicy, WindowKey};

/// Rate limiter trait - abstraction over window stores (in-process, Redis).
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count a request for `key` under `policy` and decide whether it is admitted.
    ///
    /// Implementations must perform read-check-increment as one atomic step
    /// per key, and must not count denied requests.
    async fn check(
        &self,
        key: &WindowKey,
        policy: &RoutePolicy,
        now_ms: u64,
    ) -> Result<RateLimitResult, RateLimitError>;

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    /// Absolute end of the current window, in milliseconds since the epoch.
    pub reset_at_ms: u64,
}

impl RateLimitResult {
    /// Seconds a denied client should wait, rounded up and never below one.
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        self.reset_at_ms
            .saturating_sub(now_ms)
            .div_ceil(1_000)
            .max(1)
    }
}

/// Rate limit errors.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend returned malformed reply: {0}")]
    MalformedReply(String),
}
