//! HTTP handlers and route configuration.

mod health;
mod proxy;

use actix_web::web;

/// Configure all edge routes. Everything not handled here is forwarded upstream,
/// with request bodies buffered up to `max_body_bytes`.
pub fn configure_routes(max_body_bytes: usize) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(web::PayloadConfig::new(max_body_bytes))
            .service(web::scope("/_edge").route("/health", web::get().to(health::health_check)))
            .default_service(web::to(proxy::forward));
    }
}
