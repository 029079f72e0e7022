//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Handlers and fetcher produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID (`x-request-id`) is attached to every handler log line
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
