//! Rate limiting middleware.

use actix_web::{
    Error, HttpResponse,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderName, HeaderValue, RETRY_AFTER},
};
use futures::future::LocalBoxFuture;
use std::future::{Ready, ready};
use std::rc::Rc;
use std::sync::Arc;

use studio_core::domain::{ClientIdentity, RequestKind};
use studio_core::ports::RateLimitResult;
use studio_core::{Admission, AdmissionController};
use studio_shared::RateLimitedResponse;

pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Rate limiting middleware factory.
pub struct RateLimitMiddleware {
    controller: Arc<AdmissionController>,
    trust_proxy_headers: bool,
}

impl RateLimitMiddleware {
    pub fn new(controller: Arc<AdmissionController>, trust_proxy_headers: bool) -> Self {
        Self {
            controller,
            trust_proxy_headers,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            controller: self.controller.clone(),
            trust_proxy_headers: self.trust_proxy_headers,
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    controller: Arc<AdmissionController>,
    trust_proxy_headers: bool,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let controller = self.controller.clone();

        let client = client_identity(&req, self.trust_proxy_headers);
        let kind = RequestKind::from_method(req.method().as_str());
        let path = req.path().to_string();

        Box::pin(async move {
            match controller.check(&path, kind, &client).await {
                Admission::Metered { result, .. } if !result.allowed => {
                    let response = rate_limited_response(&result, controller.now_ms());
                    let (http_req, _payload) = req.into_parts();
                    Ok(ServiceResponse::new(http_req, response).map_into_right_body())
                }
                Admission::Metered { result, .. } => {
                    let mut res = service.call(req).await?;
                    res.headers_mut().insert(
                        HeaderName::from_static(REMAINING_HEADER),
                        HeaderValue::from(result.remaining),
                    );
                    Ok(res.map_into_left_body())
                }
                Admission::Unmetered => {
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
            }
        })
    }
}

/// Best-effort client identity. Proxy headers are only read when trusted.
fn client_identity(req: &ServiceRequest, trust_proxy_headers: bool) -> ClientIdentity {
    let header = |name: &str| req.headers().get(name).and_then(|v| v.to_str().ok());
    let peer = req.peer_addr().map(|addr| addr.ip().to_string());

    if trust_proxy_headers {
        ClientIdentity::from_headers(
            header("x-forwarded-for"),
            header("x-real-ip"),
            peer.as_deref(),
        )
    } else {
        ClientIdentity::from_headers(None, None, peer.as_deref())
    }
}

/// 429 with retry guidance for a denied request.
pub fn rate_limited_response(result: &RateLimitResult, now_ms: u64) -> HttpResponse {
    HttpResponse::TooManyRequests()
        .insert_header((RETRY_AFTER, result.retry_after_secs(now_ms).to_string()))
        .insert_header((REMAINING_HEADER, "0"))
        .json(RateLimitedResponse::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test as actix_test, web};

    use studio_core::RouteClassifier;
    use studio_core::domain::{PolicyTable, RouteGroup, RoutePolicy};
    use studio_core::ports::ManualClock;
    use studio_infra::InMemoryRateLimiter;

    fn controller(clock: &ManualClock) -> Arc<AdmissionController> {
        let policies = PolicyTable::default()
            .with(RouteGroup::Auth, RoutePolicy::new(60_000, 2).unwrap());
        Arc::new(AdmissionController::new(
            Arc::new(InMemoryRateLimiter::default()),
            Arc::new(clock.clone()),
            RouteClassifier::default(),
            policies,
        ))
    }

    async fn ok() -> HttpResponse {
        HttpResponse::Ok().body("downstream")
    }

    fn login_from(ip: &str) -> actix_test::TestRequest {
        actix_test::TestRequest::post()
            .uri("/login")
            .insert_header(("x-forwarded-for", format!("{ip}, 10.0.0.1")))
    }

    #[actix_web::test]
    async fn test_denied_request_gets_429() {
        let clock = ManualClock::new(1_000);
        let app = actix_test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(controller(&clock), true))
                .default_service(web::to(ok)),
        )
        .await;

        for expected in ["1", "0"] {
            let res = actix_test::call_service(&app, login_from("1.2.3.4").to_request()).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(res.headers().get(REMAINING_HEADER).unwrap(), expected);
        }

        clock.set(1_100);
        let res = actix_test::call_service(&app, login_from("1.2.3.4").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(res.headers().get(RETRY_AFTER).unwrap(), "60");
        assert_eq!(res.headers().get(REMAINING_HEADER).unwrap(), "0");

        let body: RateLimitedResponse = actix_test::read_body_json(res).await;
        assert_eq!(body, RateLimitedResponse::default());
    }

    #[actix_web::test]
    async fn test_other_client_is_unaffected() {
        let clock = ManualClock::new(0);
        let app = actix_test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(controller(&clock), true))
                .default_service(web::to(ok)),
        )
        .await;

        for _ in 0..3 {
            actix_test::call_service(&app, login_from("1.2.3.4").to_request()).await;
        }
        let res = actix_test::call_service(&app, login_from("5.6.7.8").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_window_reset_admits_again() {
        let clock = ManualClock::new(0);
        let app = actix_test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(controller(&clock), true))
                .default_service(web::to(ok)),
        )
        .await;

        for _ in 0..3 {
            actix_test::call_service(&app, login_from("1.2.3.4").to_request()).await;
        }
        clock.set(60_000);
        let res = actix_test::call_service(&app, login_from("1.2.3.4").to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers().get(REMAINING_HEADER).unwrap(), "1");
    }

    #[actix_web::test]
    async fn test_unmatched_path_passes_through() {
        let clock = ManualClock::new(0);
        let app = actix_test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(controller(&clock), true))
                .default_service(web::to(ok)),
        )
        .await;

        for _ in 0..50 {
            let req = actix_test::TestRequest::post().uri("/projects/new").to_request();
            let res = actix_test::call_service(&app, req).await;
            assert_eq!(res.status(), StatusCode::OK);
            assert!(res.headers().get(REMAINING_HEADER).is_none());
        }
    }

    #[actix_web::test]
    async fn test_untrusted_proxy_headers_share_peer_counter() {
        let clock = ManualClock::new(0);
        let app = actix_test::init_service(
            App::new()
                .wrap(RateLimitMiddleware::new(controller(&clock), false))
                .default_service(web::to(ok)),
        )
        .await;

        // Spoofed chains are ignored; without a peer address every request
        // falls into the shared sentinel bucket.
        for ip in ["1.1.1.1", "2.2.2.2"] {
            let res = actix_test::call_service(&app, login_from(ip).to_request()).await;
            assert_eq!(res.status(), StatusCode::OK);
        }
        let res = actix_test::call_service(&app, login_from("3.3.3.3").to_request()).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_retry_after_floor() {
        let result = RateLimitResult {
            allowed: false,
            remaining: 0,
            reset_at_ms: 5_000,
        };
        let res = rate_limited_response(&result, 9_000);
        assert_eq!(res.headers().get(RETRY_AFTER).unwrap(), "1");
    }
}
