#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(warnings)]
// Allow some overly strict pedantic lints for middleware code
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]

//! Request Pipeline Service
//!
//! The request-processing pipeline of the backend: correlation ids, panic
//! containment, access logging, security headers, request timeouts,
//! per-client rate limiting and signed-token authentication, applied in a
//! fixed order to every inbound request before the business handler runs.

pub mod infrastructure;
pub mod presentation;

// Re-export commonly used types
pub use presentation::middleware::{AppError, AuthenticatedPrincipal, CorrelationId};
