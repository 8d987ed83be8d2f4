//! Cron-style job scheduler using tokio-cron-scheduler.

use std::sync::Arc;

use studio_core::AdmissionController;
use studio_infra::InMemoryRateLimiter;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Enable scheduler.
    pub enabled: bool,
    /// Cron expression (with seconds) for the stale-window sweep.
    pub sweep_cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_cron: "*/30 * * * * *".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("SCHEDULER_ENABLED")
                .ok()
                .and_then(|v| crate::config::parse_bool(&v))
                .unwrap_or(true),
            sweep_cron: std::env::var("RATE_LIMIT_SWEEP_CRON")
                .unwrap_or_else(|_| Self::default().sweep_cron),
        }
    }
}

/// Cron job scheduler wrapper.
pub struct Scheduler {
    inner: JobScheduler,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Create a new scheduler.
    pub async fn new(config: SchedulerConfig) -> Result<Self, JobSchedulerError> {
        let inner = JobScheduler::new().await?;
        Ok(Self { inner, config })
    }

    /// Add a cron job.
    pub async fn add_cron<F, Fut>(
        &self,
        schedule: &str,
        task: F,
    ) -> Result<uuid::Uuid, JobSchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let job = Job::new_async(schedule, move |_uuid, _lock| {
            let task = task.clone();
            Box::pin(async move {
                task().await;
            })
        })?;

        let id = self.inner.add(job).await?;
        tracing::info!(schedule = %schedule, job_id = %id, "Cron job registered");
        Ok(id)
    }

    /// Register the periodic sweep of stale in-memory window entries.
    pub async fn add_window_sweep(
        &self,
        limiter: Arc<InMemoryRateLimiter>,
        controller: Arc<AdmissionController>,
    ) -> Result<uuid::Uuid, JobSchedulerError> {
        let schedule = self.config.sweep_cron.clone();
        self.add_cron(&schedule, move || {
            let limiter = limiter.clone();
            let controller = controller.clone();
            async move {
                let removed = limiter.sweep(controller.now_ms());
                tracing::debug!(removed, remaining = limiter.len(), "Swept stale rate windows");
            }
        })
        .await
    }

    /// Start the scheduler.
    pub async fn start(&self) -> Result<(), JobSchedulerError> {
        if !self.config.enabled {
            tracing::info!("Scheduler disabled");
            return Ok(());
        }

        self.inner.start().await?;
        tracing::info!("Scheduler started");
        Ok(())
    }

    /// Stop the scheduler.
    pub async fn shutdown(&mut self) -> Result<(), JobSchedulerError> {
        self.inner.shutdown().await?;
        tracing::info!("Scheduler stopped");
        Ok(())
    }
}
