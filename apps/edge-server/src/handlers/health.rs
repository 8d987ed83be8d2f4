//! Health check endpoint.

use actix_web::{HttpResponse, web};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: String,
    pub backend: &'static str,
    /// Window entries held in this process, when counters are local.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracked_clients: Option<usize>,
}

/// Health check endpoint - returns server status.
///
/// GET /_edge/health
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let response = HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
        backend: state.controller.backend(),
        tracked_clients: state.local_limiter.as_ref().map(|l| l.len()),
    };

    HttpResponse::Ok().json(response)
}
