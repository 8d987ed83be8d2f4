//! Domain-level error types.

use thiserror::Error;

/// Domain errors - invalid policy input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(String),
}
