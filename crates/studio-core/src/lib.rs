//! # Studio Core
//!
//! The admission-control layer of the studio edge.
//! This crate contains pure decision logic with zero infrastructure dependencies:
//! route classification, fixed-window bookkeeping and the admission controller.

pub mod admission;
pub mod classifier;
pub mod domain;
pub mod error;
pub mod ports;

pub use admission::{Admission, AdmissionController};
pub use classifier::RouteClassifier;
pub use error::DomainError;
