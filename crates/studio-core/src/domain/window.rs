//! Fixed-window counter for one (client, route group) pair.

use crate::domain::RoutePolicy;
use crate::ports::RateLimitResult;

/// Counter state of a single fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindowEntry {
    pub count: u32,
    pub window_start_ms: u64,
}

impl RateWindowEntry {
    /// Open a window for a first request, counting that request.
    pub fn start(policy: &RoutePolicy, now_ms: u64) -> (Self, RateLimitResult) {
        let entry = Self {
            count: 1,
            window_start_ms: now_ms,
        };
        let result = entry.admitted(policy);
        (entry, result)
    }

    pub fn reset_at_ms(&self, policy: &RoutePolicy) -> u64 {
        self.window_start_ms.saturating_add(policy.window_ms())
    }

    /// Whether the window is over. A clock that went backwards keeps the
    /// window active.
    pub fn is_expired(&self, policy: &RoutePolicy, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.window_start_ms) >= policy.window_ms()
    }

    /// Whether the window ended at least `retention_windows` windows ago.
    pub fn is_stale(&self, policy: &RoutePolicy, now_ms: u64, retention_windows: u32) -> bool {
        let retention = policy
            .window_ms()
            .saturating_mul(u64::from(retention_windows.max(1)));
        now_ms.saturating_sub(self.window_start_ms) >= retention
    }

    /// Record a request arriving at `now_ms`.
    ///
    /// Rolls the window over when it has elapsed, counts the request while
    /// under the ceiling, and otherwise denies without touching the count.
    pub fn observe(&mut self, policy: &RoutePolicy, now_ms: u64) -> RateLimitResult {
        if self.is_expired(policy, now_ms) {
            *self = Self {
                count: 1,
                window_start_ms: now_ms,
            };
            return self.admitted(policy);
        }

        if self.count < policy.max_requests() {
            self.count += 1;
            return self.admitted(policy);
        }

        RateLimitResult {
            allowed: false,
            remaining: 0,
            reset_at_ms: self.reset_at_ms(policy),
        }
    }

    fn admitted(&self, policy: &RoutePolicy) -> RateLimitResult {
        RateLimitResult {
            allowed: true,
            remaining: policy.max_requests().saturating_sub(self.count),
            reset_at_ms: self.reset_at_ms(policy),
        }
    }
}
