//! Browse proxy library.
//!
//! Fetches a caller-chosen page, rewrites its links so navigation stays on the
//! proxy, and serves it back with permissive CORS headers.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ───────────────▶ http::server ──▶ http::browse ──▶ upstream (Fetcher)
//!                                           │                  │
//!                                           │                  ▼
//!     Client Response                       │             target site
//!     ◀─────────────── http::response ◀── rewrite ◀────────────┘
//!
//!     Cross-cutting: config, observability, lifecycle, error
//! ```

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod link;
pub mod observability;
pub mod rewrite;
pub mod upstream;

pub use config::schema::ProxyConfig;
pub use error::ProxyError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
