//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_rewrites_total` (counter): body rewrites by transformer, outcome
//!
//! # Design Decisions
//! - Recording is a no-op when no exporter is installed (tests, `--check`)
//! - Labels are bounded: route names come from config, outcomes from `ErrorKind`

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
///
/// Failures are logged; the gateway keeps serving without metrics.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe_metrics();
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter");
        }
    }
}

fn describe_metrics() {
    describe_counter!("gateway_requests_total", "Total number of proxied requests");
    describe_histogram!(
        "gateway_request_duration_seconds",
        "Request duration in seconds, rewrite included"
    );
    describe_counter!(
        "gateway_rewrites_total",
        "Response body rewrites by transformer and outcome"
    );
}

/// Record a finished request.
pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("route", route.to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

/// Record one rewrite attempt. `outcome` is `rewritten`, `skipped` or an error kind.
pub fn record_rewrite(transformer: &str, outcome: &str) {
    counter!(
        "gateway_rewrites_total",
        "transformer" => transformer.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}
