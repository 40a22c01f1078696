//! HTTP server module
//!
//! Axum router, request handlers and middleware for the concatenation API.

pub mod handlers;
pub mod middleware;
pub mod routes;

pub use routes::create_router;
