//! Redis rate limiter implementation using a shared fixed-window counter.
//!
//! Every instance pointing at the same Redis sees the same counters, so the
//! limit holds across the whole deployment instead of per process.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use studio_core::domain::{RoutePolicy, WindowKey};
use studio_core::ports::{RateLimitError, RateLimitResult, RateLimiter};

/// Redis connection configuration.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whether to fall back to the in-memory limiter if Redis is unavailable at startup
    pub fallback_to_memory: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            fallback_to_memory: true,
        }
    }
}

/// Redis rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RedisRateLimitConfig {
    /// Redis connection config
    pub redis: RedisConfig,
    /// Key prefix for rate limit keys
    pub key_prefix: String,
}

impl Default for RedisRateLimitConfig {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            key_prefix: "ratelimit".to_string(),
        }
    }
}

// Returns {allowed, count, pttl_ms}. A full window is reported without
// incrementing, so denied requests never extend the count.
const FIXED_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local max_requests = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])

local current = tonumber(redis.call('GET', key) or '0')
if current >= max_requests then
    return {0, current, redis.call('PTTL', key)}
end

current = redis.call('INCR', key)
if current == 1 then
    redis.call('PEXPIRE', key, window_ms)
end

return {1, current, redis.call('PTTL', key)}
"#;

/// Redis-backed rate limiter using a fixed window per key.
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    config: RedisRateLimitConfig,
    /// Lua script for atomic check-and-increment with expiry
    script: Script,
}

impl RedisRateLimiter {
    pub async fn new(config: RedisRateLimitConfig) -> Result<Self, RateLimitError> {
        let client = Client::open(config.redis.url.as_str())
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        // Use timeout to prevent hanging if Redis is unreachable
        let conn_manager_fut = ConnectionManager::new(client);
        let conn = tokio::time::timeout(config.redis.connect_timeout, conn_manager_fut)
            .await
            .map_err(|_| RateLimitError::Backend("Connection timed out".to_string()))?
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        tracing::info!(url = %config.redis.url, "Connected to Redis rate limiter");

        Ok(Self {
            conn,
            config,
            script: Script::new(FIXED_WINDOW_SCRIPT),
        })
    }

    fn make_key(&self, key: &WindowKey) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }
}

/// Turn the script reply into a result. The window's end comes from the key's
/// remaining TTL; a missing TTL means a full window from now.
fn interpret_reply(
    reply: &[i64],
    policy: &RoutePolicy,
    now_ms: u64,
) -> Result<RateLimitResult, RateLimitError> {
    let [allowed, count, pttl] = reply else {
        return Err(RateLimitError::MalformedReply(format!("{reply:?}")));
    };

    let ttl_ms = u64::try_from(*pttl)
        .ok()
        .filter(|ttl| *ttl > 0)
        .unwrap_or(policy.window_ms());
    let count = u32::try_from(*count).unwrap_or(u32::MAX);
    let allowed = *allowed == 1;

    Ok(RateLimitResult {
        allowed,
        remaining: if allowed {
            policy.max_requests().saturating_sub(count)
        } else {
            0
        },
        reset_at_ms: now_ms.saturating_add(ttl_ms),
    })
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(
        &self,
        key: &WindowKey,
        policy: &RoutePolicy,
        now_ms: u64,
    ) -> Result<RateLimitResult, RateLimitError> {
        let redis_key = self.make_key(key);
        let mut conn = self.conn.clone();

        let reply: Vec<i64> = self
            .script
            .key(&redis_key)
            .arg(policy.max_requests())
            .arg(policy.window_ms())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        interpret_reply(&reply, policy, now_ms)
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
