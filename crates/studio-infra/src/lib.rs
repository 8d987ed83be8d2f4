//! # Studio Infrastructure
//!
//! Concrete window stores implementing the `RateLimiter` port from `studio-core`.
//!
//! ## Feature Flags
//!
//! - `full` (default) - All stores enabled
//! - `minimal` - In-process store only
//! - `rate-limit` - In-process fixed-window store backed by `dashmap`
//! - `redis` - Shared fixed-window store backed by Redis

#[cfg(feature = "rate-limit")]
pub mod rate_limit;

#[cfg(feature = "rate-limit")]
pub use rate_limit::{InMemoryRateLimiter, RateLimitConfig};

#[cfg(feature = "redis")]
pub use rate_limit::{RedisConfig, RedisRateLimitConfig, RedisRateLimiter};
