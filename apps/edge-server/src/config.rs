//! Application configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use studio_core::domain::{PolicyTable, RouteGroup, RoutePolicy};
use studio_infra::RateLimitConfig;
#[cfg(feature = "redis")]
use studio_infra::{RedisConfig, RedisRateLimitConfig};

/// Configuration errors. Reported at startup; the affected field keeps its default.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name}: cannot parse {value:?}")]
    Unparsable { name: String, value: String },

    #[error("{name}: {reason}")]
    Invalid { name: String, reason: String },
}

/// Which store keeps the window counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterBackend {
    Memory,
    Redis,
}

impl FromStr for LimiterBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(LimiterBackend::Memory),
            "redis" => Ok(LimiterBackend::Redis),
            other => Err(format!("unknown backend {other}")),
        }
    }
}

/// Where admitted requests are forwarded.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub url: String,
    pub timeout: Duration,
}

/// Default cap on buffered request bodies: 50 MiB, enough for document uploads.
pub const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub upstream: Option<UpstreamConfig>,
    /// Largest request body the proxy buffers before forwarding.
    pub max_body_bytes: usize,
    /// Read client addresses from `X-Forwarded-For` / `X-Real-IP`.
    pub trust_proxy_headers: bool,
    pub backend: LimiterBackend,
    pub policies: PolicyTable,
    pub memory: RateLimitConfig,
    #[cfg(feature = "redis")]
    pub redis: RedisRateLimitConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let (config, errors) = Self::from_lookup(|name| env::var(name).ok());
        for error in &errors {
            tracing::warn!(error = %error, "Ignoring invalid configuration value");
        }
        config
    }

    /// Build the configuration from any variable source. Invalid values are
    /// returned alongside the config, which uses defaults in their place.
    pub fn from_lookup<F>(lookup: F) -> (Self, Vec<ConfigError>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut errors = Vec::new();

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or(&lookup, "PORT", 8080, &mut errors);

        let upstream = lookup("UPSTREAM_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .map(|url| UpstreamConfig {
                url,
                timeout: Duration::from_secs(parse_or(
                    &lookup,
                    "UPSTREAM_TIMEOUT_SECS",
                    30,
                    &mut errors,
                )),
            });

        let max_body_bytes = parse_positive(
            &lookup,
            "MAX_BODY_BYTES",
            DEFAULT_MAX_BODY_BYTES,
            &mut errors,
        );

        let trust_proxy_headers = parse_flag(&lookup, "TRUST_PROXY_HEADERS", true, &mut errors);

        // Shared counters change the observable limit, so Redis is opt-in.
        let backend = parse_or(
            &lookup,
            "RATE_LIMIT_BACKEND",
            LimiterBackend::Memory,
            &mut errors,
        );
        #[cfg(not(feature = "redis"))]
        let backend = if backend == LimiterBackend::Redis {
            errors.push(ConfigError::Invalid {
                name: "RATE_LIMIT_BACKEND".to_string(),
                reason: "built without the redis feature".to_string(),
            });
            LimiterBackend::Memory
        } else {
            backend
        };

        let policies = Self::parse_policies(&lookup, &mut errors);

        let memory_defaults = RateLimitConfig::default();
        let memory = RateLimitConfig {
            max_entries: parse_positive(
                &lookup,
                "RATE_LIMIT_MAX_ENTRIES",
                memory_defaults.max_entries,
                &mut errors,
            ),
            retention_windows: parse_positive(
                &lookup,
                "RATE_LIMIT_RETENTION_WINDOWS",
                memory_defaults.retention_windows,
                &mut errors,
            ),
        };

        #[cfg(feature = "redis")]
        let redis = Self::parse_redis(&lookup, &mut errors);

        let config = Self {
            host,
            port,
            upstream,
            max_body_bytes,
            trust_proxy_headers,
            backend,
            policies,
            memory,
            #[cfg(feature = "redis")]
            redis,
        };

        (config, errors)
    }

    /// Read per-group overrides.
    /// Format: RATE_LIMIT_<GROUP>_WINDOW_MS and RATE_LIMIT_<GROUP>_MAX_REQUESTS
    /// Example: RATE_LIMIT_API_WRITE_MAX_REQUESTS=50
    fn parse_policies<F>(lookup: &F, errors: &mut Vec<ConfigError>) -> PolicyTable
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut policies = PolicyTable::default();

        for group in RouteGroup::ALL {
            let prefix = group.env_prefix();
            let current = policies.get(group);
            let window_name = format!("{prefix}_WINDOW_MS");
            let max_name = format!("{prefix}_MAX_REQUESTS");

            let window_ms = parse_or(lookup, &window_name, current.window_ms(), errors);
            let max_requests = parse_or(lookup, &max_name, current.max_requests(), errors);

            match RoutePolicy::new(window_ms, max_requests) {
                Ok(policy) => policies.set(group, policy),
                Err(e) => errors.push(ConfigError::Invalid {
                    name: prefix,
                    reason: e.to_string(),
                }),
            }
        }

        policies
    }

    #[cfg(feature = "redis")]
    fn parse_redis<F>(lookup: &F, errors: &mut Vec<ConfigError>) -> RedisRateLimitConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = RedisRateLimitConfig::default();
        let connect_secs = parse_positive(
            lookup,
            "REDIS_CONNECT_TIMEOUT_SECS",
            defaults.redis.connect_timeout.as_secs(),
            errors,
        );

        RedisRateLimitConfig {
            redis: RedisConfig {
                url: lookup("REDIS_URL")
                    .map(|url| url.trim().to_string())
                    .filter(|url| !url.is_empty())
                    .unwrap_or(defaults.redis.url),
                connect_timeout: Duration::from_secs(connect_secs),
                fallback_to_memory: parse_flag(
                    lookup,
                    "REDIS_FALLBACK_TO_MEMORY",
                    defaults.redis.fallback_to_memory,
                    errors,
                ),
            },
            key_prefix: lookup("RATE_LIMIT_KEY_PREFIX")
                .map(|prefix| prefix.trim().to_string())
                .filter(|prefix| !prefix.is_empty())
                .unwrap_or(defaults.key_prefix),
        }
    }
}

/// Boolean settings accept true/false, 1/0, yes/no and on/off in any case.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_flag<F>(lookup: &F, name: &str, default: bool, errors: &mut Vec<ConfigError>) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return default;
    };
    parse_bool(&value).unwrap_or_else(|| {
        errors.push(ConfigError::Unparsable {
            name: name.to_string(),
            value,
        });
        default
    })
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T, errors: &mut Vec<ConfigError>) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(value) = lookup(name) else {
        return default;
    };
    match value.trim().parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            errors.push(ConfigError::Unparsable {
                name: name.to_string(),
                value,
            });
            default
        }
    }
}

fn parse_positive<F, T>(lookup: &F, name: &str, default: T, errors: &mut Vec<ConfigError>) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default + Copy,
{
    let value = parse_or(lookup, name, default, errors);
    if value > T::default() {
        return value;
    }
    errors.push(ConfigError::Invalid {
        name: name.to_string(),
        reason: "must be positive".to_string(),
    });
    default
}
