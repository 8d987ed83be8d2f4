//! Error handling middleware - RFC 7807 compliant responses.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use studio_shared::ErrorResponse;
use std::fmt;

/// Edge-level error type that converts to RFC 7807 responses.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadGateway(String),
    GatewayTimeout,
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadGateway(msg) => write!(f, "Bad gateway: {}", msg),
            AppError::GatewayTimeout => write!(f, "Upstream timed out"),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            AppError::NotFound(detail) => ErrorResponse::not_found(detail),
            AppError::BadGateway(detail) => {
                tracing::warn!("Upstream error: {}", detail);
                ErrorResponse::bad_gateway("The studio application could not be reached.")
            }
            AppError::GatewayTimeout => ErrorResponse::new(504, "Gateway Timeout")
                .with_detail("The studio application did not respond in time."),
            AppError::Internal(detail) => {
                // Log internal errors
                tracing::error!("Internal error: {}", detail);
                ErrorResponse::internal_error()
            }
        };

        HttpResponse::build(self.status_code()).json(error)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::GatewayTimeout
        } else if err.is_builder() {
            AppError::Internal(err.to_string())
        } else {
            AppError::BadGateway(err.to_string())
        }
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn test_bad_gateway_hides_upstream_detail() {
        let res = AppError::BadGateway("connection refused (10.0.0.7:3000)".to_string())
            .error_response();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);

        let body = to_bytes(res.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], 502);
        assert!(!json["detail"].as_str().unwrap().contains("10.0.0.7"));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::NotFound("x".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(AppError::GatewayTimeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }
}
