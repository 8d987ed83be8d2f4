//! In-memory fixed-window rate limiter.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use studio_core::domain::{RateWindowEntry, RoutePolicy, WindowKey};
use studio_core::ports::{RateLimitError, RateLimitResult, RateLimiter};

/// In-memory rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Upper bound on tracked (client, group) pairs.
    pub max_entries: usize,
    /// Windows an entry must be expired for before a sweep removes it.
    pub retention_windows: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_entries: 100_000,
            retention_windows: 2,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    entry: RateWindowEntry,
    policy: RoutePolicy,
}

const NEVER: u64 = u64::MAX;

/// Fixed-window counters keyed by (route group, client).
///
/// Each check holds the key's shard lock for the whole read-check-increment.
/// Limits are per-process, not shared across instances.
///
/// At capacity, expired entries are reclaimed by a full-map scan that runs at
/// most once per shortest window seen; between scans new keys are admitted
/// untracked.
pub struct InMemoryRateLimiter {
    slots: DashMap<WindowKey, Slot>,
    config: RateLimitConfig,
    last_reclaim_ms: AtomicU64,
    shortest_window_ms: AtomicU64,
}

impl InMemoryRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            slots: DashMap::new(),
            config,
            last_reclaim_ms: AtomicU64::new(NEVER),
            shortest_window_ms: AtomicU64::new(u64::MAX),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Remove entries whose window ended `retention_windows` windows ago.
    /// Returns how many were removed.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let before = self.slots.len();
        let retention = self.config.retention_windows;
        self.slots
            .retain(|_, slot| !slot.entry.is_stale(&slot.policy, now_ms, retention));
        before.saturating_sub(self.slots.len())
    }

    /// Claims the right to scan. Only one caller wins per interval.
    fn claim_reclaim(&self, now_ms: u64) -> bool {
        let last = self.last_reclaim_ms.load(Ordering::Acquire);
        let interval = self.shortest_window_ms.load(Ordering::Relaxed);
        if last != NEVER && now_ms.saturating_sub(last) < interval {
            return false;
        }
        self.last_reclaim_ms
            .compare_exchange(last, now_ms, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn make_room(&self, now_ms: u64) -> bool {
        if self.slots.len() < self.config.max_entries {
            return true;
        }
        if !self.claim_reclaim(now_ms) {
            return false;
        }
        // Anything already expired can go, not just stale entries.
        self.slots
            .retain(|_, slot| !slot.entry.is_expired(&slot.policy, now_ms));
        tracing::debug!(remaining = self.slots.len(), "Reclaimed expired rate windows");
        self.slots.len() < self.config.max_entries
    }
}

impl Default for InMemoryRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(
        &self,
        key: &WindowKey,
        policy: &RoutePolicy,
        now_ms: u64,
    ) -> Result<RateLimitResult, RateLimitError> {
        self.shortest_window_ms
            .fetch_min(policy.window_ms(), Ordering::Relaxed);

        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.policy = *policy;
            return Ok(slot.entry.observe(policy, now_ms));
        }

        // Must not hold a shard guard here: make_room takes every shard.
        if !self.make_room(now_ms) {
            tracing::warn!(
                key = %key,
                max_entries = self.config.max_entries,
                "Rate limiter at capacity, admitting untracked"
            );
            let (_, result) = RateWindowEntry::start(policy, now_ms);
            return Ok(result);
        }

        let result = match self.slots.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let slot = occupied.get_mut();
                slot.policy = *policy;
                slot.entry.observe(policy, now_ms)
            }
            Entry::Vacant(vacant) => {
                let (entry, result) = RateWindowEntry::start(policy, now_ms);
                vacant.insert(Slot {
                    entry,
                    policy: *policy,
                });
                result
            }
        };

        Ok(result)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::sync::Barrier;

    use studio_core::domain::{ClientIdentity, RouteGroup};

    fn key(client: &str) -> WindowKey {
        WindowKey::new(RouteGroup::Auth, ClientIdentity::from(client))
    }

    fn policy() -> RoutePolicy {
        RoutePolicy::new(60_000, 5).unwrap()
    }

    #[tokio::test]
    async fn test_fixed_window_lifecycle() {
        let limiter = InMemoryRateLimiter::default();
        let key = key("1.2.3.4");
        let policy = policy();

        for expected in [4, 3, 2, 1, 0] {
            let res = limiter.check(&key, &policy, 0).await.unwrap();
            assert!(res.allowed);
            assert_eq!(res.remaining, expected);
        }

        let res = limiter.check(&key, &policy, 100).await.unwrap();
        assert!(!res.allowed);
        assert_eq!(res.remaining, 0);
        assert_eq!(res.reset_at_ms, 60_000);
        assert_eq!(res.retry_after_secs(100), 60);

        let res = limiter.check(&key, &policy, 61_000).await.unwrap();
        assert!(res.allowed);
        assert_eq!(res.remaining, 4);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_stale_entries() {
        let limiter = InMemoryRateLimiter::default();
        let policy = policy();

        limiter.check(&key("old"), &policy, 0).await.unwrap();
        limiter.check(&key("new"), &policy, 100_000).await.unwrap();
        assert_eq!(limiter.len(), 2);

        assert_eq!(limiter.sweep(110_000), 0);
        assert_eq!(limiter.sweep(120_000), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[tokio::test]
    async fn test_capacity_bound_evicts_expired_first() {
        let limiter = InMemoryRateLimiter::new(RateLimitConfig {
            max_entries: 2,
            retention_windows: 2,
        });
        let policy = policy();

        limiter.check(&key("a"), &policy, 0).await.unwrap();
        limiter.check(&key("b"), &policy, 30_000).await.unwrap();

        // "a" expired at 60s, so there is room for "c".
        let res = limiter.check(&key("c"), &policy, 61_000).await.unwrap();
        assert!(res.allowed);
        assert_eq!(limiter.len(), 2);
    }

    #[tokio::test]
    async fn test_capacity_bound_admits_untracked_when_full() {
        let limiter = InMemoryRateLimiter::new(RateLimitConfig {
            max_entries: 1,
            retention_windows: 2,
        });
        let policy = policy();

        limiter.check(&key("a"), &policy, 0).await.unwrap();
        for _ in 0..10 {
            let res = limiter.check(&key("b"), &policy, 10).await.unwrap();
            assert!(res.allowed);
        }
        assert_eq!(limiter.len(), 1);
    }

    #[tokio::test]
    async fn test_reclaim_scan_is_throttled_at_capacity() {
        let limiter = InMemoryRateLimiter::new(RateLimitConfig {
            max_entries: 2,
            retention_windows: 2,
        });
        let policy = policy();

        limiter.check(&key("a"), &policy, 0).await.unwrap();
        limiter.check(&key("b"), &policy, 30_000).await.unwrap();

        // First scan at capacity finds nothing expired.
        let res = limiter.check(&key("c"), &policy, 50_000).await.unwrap();
        assert!(res.allowed);

        // "a" expired at 60s, but the last scan was under a window ago, so
        // a flood of fresh keys is admitted without touching the map.
        for i in 0..100 {
            let client = format!("rotating-{i}");
            let res = limiter.check(&key(&client), &policy, 70_000).await.unwrap();
            assert!(res.allowed);
        }
        assert_eq!(limiter.len(), 2);
        let res = limiter.check(&key("a"), &policy, 70_000).await.unwrap();
        assert_eq!(res.remaining, 4, "expired entry kept and rolled over in place");

        // A window after the last scan, expired entries are reclaimed again.
        let res = limiter.check(&key("d"), &policy, 140_000).await.unwrap();
        assert!(res.allowed);
        assert_eq!(limiter.len(), 1);
        let res = limiter.check(&key("d"), &policy, 140_000).await.unwrap();
        assert_eq!(res.remaining, 3, "new key is tracked after the reclaim");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_checks_never_exceed_ceiling() {
        let limiter = Arc::new(InMemoryRateLimiter::default());
        let policy = RoutePolicy::new(60_000, 50).unwrap();
        let barrier = Arc::new(Barrier::new(8));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                let key = key("shared");
                barrier.wait().await;
                let mut admitted = 0;
                for _ in 0..25 {
                    if limiter.check(&key, &policy, 1_000).await.unwrap().allowed {
                        admitted += 1;
                    }
                }
                admitted
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        assert_eq!(total, 50);
    }
}
