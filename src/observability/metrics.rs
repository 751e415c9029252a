//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ows_requests_total` (counter): dispatched requests by service, operation, status
//! - `ows_request_duration_seconds` (histogram): dispatch latency
//! - `ows_rejections_total` (counter): pipeline rejections by error kind
//!
//! # Design Decisions
//! - Labels are low-cardinality: unknown services and operations are reported as `none`

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(service: &'static str, operation: &'static str, status: u16, start: Instant) {
    ::metrics::counter!(
        "ows_requests_total",
        "service" => service,
        "operation" => operation,
        "status" => status.to_string()
    )
    .increment(1);
    ::metrics::histogram!(
        "ows_request_duration_seconds",
        "service" => service,
        "operation" => operation
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(reason: &'static str) {
    ::metrics::counter!("ows_rejections_total", "reason" => reason).increment(1);
}
