//! Pass-through to the studio application for admitted requests.
//!
//! The edge does not look at what it forwards: method, path, query, headers
//! and body go upstream as received, minus hop-by-hop headers.

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, web};
use tracing_actix_web::RequestId;

use crate::middleware::error::{AppError, AppResult};
use crate::state::AppState;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Append the peer address to any forwarded chain we received.
fn forwarded_for(req: &HttpRequest) -> Option<String> {
    let existing = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let peer = req.peer_addr().map(|addr| addr.ip().to_string());

    match (existing, peer) {
        (Some(chain), Some(peer)) => Some(format!("{chain}, {peer}")),
        (Some(chain), None) => Some(chain.to_string()),
        (None, peer) => peer,
    }
}

/// Forward any unrouted request upstream.
pub async fn forward(
    req: HttpRequest,
    body: web::Bytes,
    request_id: RequestId,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let Some(upstream) = state.upstream.as_ref() else {
        return Err(AppError::NotFound(format!("No route for {}", req.path())));
    };

    let path_and_query = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = upstream.url_for(path_and_query);

    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let mut outbound = upstream.client.request(method, &url);
    for (name, value) in req.headers() {
        if is_hop_by_hop(name.as_str()) || name.as_str().eq_ignore_ascii_case("x-forwarded-for") {
            continue;
        }
        outbound = outbound.header(name.as_str(), value.as_bytes());
    }
    if let Some(chain) = forwarded_for(&req) {
        outbound = outbound.header("x-forwarded-for", chain);
    }
    outbound = outbound.header("x-request-id", request_id.to_string());

    tracing::debug!(method = %req.method(), url = %url, "Forwarding request");

    let upstream_res = outbound.body(body.to_vec()).send().await?;

    let status = StatusCode::from_u16(upstream_res.status().as_u16())
        .map_err(|e| AppError::BadGateway(e.to_string()))?;
    let mut response = HttpResponse::build(status);
    for (name, value) in upstream_res.headers() {
        if is_hop_by_hop(name.as_str()) || name.as_str().eq_ignore_ascii_case("content-length") {
            continue;
        }
        response.append_header((name.as_str(), value.as_bytes()));
    }

    let bytes = upstream_res.bytes().await?;
    Ok(response.body(bytes.to_vec()))
}
