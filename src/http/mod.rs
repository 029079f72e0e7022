//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → browse.rs (GET / POST / OPTIONS handlers)
//!         → request.rs (target extraction, validation, app origin)
//!         → upstream fetch + rewrite
//!         → response.rs (CORS, cache headers)
//!     → Send to client
//! ```

pub mod browse;
pub mod request;
pub mod response;
pub mod server;

pub use server::{build_router, AppState, HttpServer};

/// Header carrying the per-request correlation ID.
pub const X_REQUEST_ID: &str = "x-request-id";
