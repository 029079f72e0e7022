//! Metrics collection and exposition.
//!
//! # Metrics
//! - `browse_requests_total` (counter): requests by method, status
//! - `browse_request_duration_seconds` (histogram): latency by method
//! - `browse_upstream_failures_total` (counter): failed fetches by kind
//! - `browse_rewrites_total` (counter): HTML documents rewritten
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        "browse_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("browse_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_failure(kind: &'static str) {
    counter!("browse_upstream_failures_total", "kind" => kind).increment(1);
}

pub fn record_rewrite() {
    counter!("browse_rewrites_total").increment(1);
}
