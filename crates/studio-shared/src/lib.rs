//! # Studio Shared
//!
//! Wire types returned by the studio edge, shared with any client that needs
//! to parse them.

pub mod response;

pub use response::{ErrorResponse, RateLimitedResponse};
