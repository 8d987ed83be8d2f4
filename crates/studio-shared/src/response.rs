//! Standardized edge response bodies.

use serde::{Deserialize, Serialize};

/// Body of a 429 rejection. The shape is fixed; clients match on `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitedResponse {
    pub error: String,
    pub message: String,
}

impl Default for RateLimitedResponse {
    fn default() -> Self {
        Self {
            error: "Too Many Requests".to_string(),
            message: "Rate limit exceeded. Try again later.".to_string(),
        }
    }
}

/// RFC 7807 Problem Details for HTTP APIs.
///
/// See: https://datatracker.ietf.org/doc/html/rfc7807
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// A URI reference that identifies the problem type.
    #[serde(rename = "type")]
    pub error_type: String,

    /// A short, human-readable summary of the problem type.
    pub title: String,

    /// The HTTP status code.
    pub status: u16,

    /// A human-readable explanation specific to this occurrence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorResponse {
    pub fn new(status: u16, title: impl Into<String>) -> Self {
        Self {
            error_type: "about:blank".to_string(),
            title: title.into(),
            status,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(404, "Not Found").with_detail(detail)
    }

    pub fn bad_gateway(detail: impl Into<String>) -> Self {
        Self::new(502, "Bad Gateway").with_detail(detail)
    }

    pub fn internal_error() -> Self {
        Self::new(500, "Internal Server Error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_body_shape() {
        let body = serde_json::to_value(RateLimitedResponse::default()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "error": "Too Many Requests",
                "message": "Rate limit exceeded. Try again later."
            })
        );
    }

    #[test]
    fn test_problem_details_skip_empty_detail() {
        let body = serde_json::to_value(ErrorResponse::internal_error()).unwrap();
        assert_eq!(body["type"], "about:blank");
        assert_eq!(body["status"], 500);
        assert!(body.get("detail").is_none());
    }
}
