//! Application state - shared across all handlers.

use std::sync::Arc;

use studio_core::ports::{RateLimitError, RateLimiter, SystemClock};
use studio_core::{AdmissionController, RouteClassifier};
use studio_infra::InMemoryRateLimiter;
#[cfg(feature = "redis")]
use studio_infra::RedisRateLimiter;

use crate::config::{AppConfig, LimiterBackend, UpstreamConfig};

/// Errors that stop the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Rate limiter unavailable: {0}")]
    RateLimiter(#[from] RateLimitError),

    #[error("Upstream client: {0}")]
    Upstream(#[from] reqwest::Error),
}

/// HTTP client bound to the studio application.
#[derive(Clone)]
pub struct Upstream {
    pub client: reqwest::Client,
    pub base_url: String,
}

impl Upstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.clone(),
        })
    }

    pub fn url_for(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base_url, path_and_query)
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<AdmissionController>,
    /// Present when counters live in this process and need sweeping.
    pub local_limiter: Option<Arc<InMemoryRateLimiter>>,
    pub upstream: Option<Upstream>,
    pub trust_proxy_headers: bool,
}

impl AppState {
    /// Build the application state with appropriate implementations.
    pub async fn new(config: &AppConfig) -> Result<Self, StartupError> {
        let (limiter, local_limiter) = Self::build_limiter(config).await?;

        let controller = Arc::new(AdmissionController::new(
            limiter,
            Arc::new(SystemClock),
            RouteClassifier::default(),
            config.policies.clone(),
        ));

        let upstream = match &config.upstream {
            Some(upstream) => {
                tracing::info!(url = %upstream.url, "Forwarding admitted requests");
                Some(Upstream::new(upstream)?)
            }
            None => {
                tracing::warn!("UPSTREAM_URL not set. Admitted requests will receive 404.");
                None
            }
        };

        tracing::info!(backend = controller.backend(), "Application state initialized");

        Ok(Self {
            controller,
            local_limiter,
            upstream,
            trust_proxy_headers: config.trust_proxy_headers,
        })
    }

    #[cfg(feature = "redis")]
    async fn build_limiter(
        config: &AppConfig,
    ) -> Result<(Arc<dyn RateLimiter>, Option<Arc<InMemoryRateLimiter>>), StartupError> {
        if config.backend == LimiterBackend::Memory {
            return Ok(Self::memory_limiter(config));
        }

        match RedisRateLimiter::new(config.redis.clone()).await {
            Ok(limiter) => {
                let shared: Arc<dyn RateLimiter> = Arc::new(limiter);
                Ok((shared, None))
            }
            Err(e) if config.redis.redis.fallback_to_memory => {
                tracing::error!(
                    "Failed to connect to Redis: {}. Using per-process rate limits.",
                    e
                );
                Ok(Self::memory_limiter(config))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(not(feature = "redis"))]
    async fn build_limiter(
        config: &AppConfig,
    ) -> Result<(Arc<dyn RateLimiter>, Option<Arc<InMemoryRateLimiter>>), StartupError> {
        debug_assert_eq!(config.backend, LimiterBackend::Memory);
        Ok(Self::memory_limiter(config))
    }

    fn memory_limiter(
        config: &AppConfig,
    ) -> (Arc<dyn RateLimiter>, Option<Arc<InMemoryRateLimiter>>) {
        let memory = Arc::new(InMemoryRateLimiter::new(config.memory.clone()));
        let limiter: Arc<dyn RateLimiter> = memory.clone();
        (limiter, Some(memory))
    }
}
