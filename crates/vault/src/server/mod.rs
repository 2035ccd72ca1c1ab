//! Axum HTTP facade over the credential lifecycle.
//!
//! # Responsibilities
//! - Define the Axum router with all routes and shared middleware.
//! - Inject shared application state (`AppState`) into handlers.
//! - Map lifecycle errors to status codes; only "no key available" is
//!   reported as a failure, everything else degrades silently.

pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;
