//! # Studio Edge
//!
//! Admission control in front of the studio application: every request is
//! classified, counted against its route group's fixed window, and either
//! rejected with 429 or forwarded upstream.

use actix_web::{App, HttpServer, web};
use tracing_actix_web::TracingLogger;

#[cfg(feature = "scheduler")]
mod background;
mod config;
mod handlers;
mod middleware;
mod state;
mod telemetry;

use config::AppConfig;
use middleware::RateLimitMiddleware;
use state::AppState;
use telemetry::TelemetryConfig;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_telemetry(&TelemetryConfig::from_env());

    // Load configuration
    let config = AppConfig::from_env();

    tracing::info!(
        "Starting Studio Edge on {}:{}",
        config.host,
        config.port
    );

    // Build application state
    let state = AppState::new(&config)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    #[cfg(feature = "scheduler")]
    let mut scheduler = start_scheduler(&state).await;

    let server_state = state.clone();
    let max_body_bytes = config.max_body_bytes;
    HttpServer::new(move || {
        App::new()
            .wrap(RateLimitMiddleware::new(
                server_state.controller.clone(),
                server_state.trust_proxy_headers,
            ))
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(server_state.clone()))
            .configure(handlers::configure_routes(max_body_bytes))
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await?;

    #[cfg(feature = "scheduler")]
    if let Some(scheduler) = scheduler.as_mut() {
        if let Err(e) = scheduler.shutdown().await {
            tracing::warn!("Scheduler shutdown failed: {}", e);
        }
    }

    Ok(())
}

/// Sweep stale windows when counters live in this process.
#[cfg(feature = "scheduler")]
async fn start_scheduler(state: &AppState) -> Option<background::Scheduler> {
    use background::{Scheduler, SchedulerConfig};

    let limiter = state.local_limiter.clone()?;

    let scheduler = match Scheduler::new(SchedulerConfig::from_env()).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to create scheduler: {}. Stale windows will not be swept.", e);
            return None;
        }
    };

    if let Err(e) = scheduler
        .add_window_sweep(limiter, state.controller.clone())
        .await
    {
        tracing::error!("Failed to register window sweep: {}", e);
        return None;
    }

    if let Err(e) = scheduler.start().await {
        tracing::error!("Failed to start scheduler: {}", e);
        return None;
    }

    Some(scheduler)
}
