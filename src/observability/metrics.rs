//! Metrics collection and exposition.
//!
//! # Metrics
//! - `negotiation_representations_total` (counter): chosen representation by format
//! - `negotiation_failures_total` (counter): aborted negotiations by error kind
//! - `compression_applied_total` (counter): compressed bodies by codec
//! - `compression_ratio` (histogram): compressed size / original size
//! - `stream_bytes_total` (counter): bytes copied straight to the sink
//! - `http_requests_total` (counter): requests by route and status
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_representation(format: &'static str) {
    counter!("negotiation_representations_total", "format" => format).increment(1);
}

pub fn record_failure(kind: &'static str) {
    counter!("negotiation_failures_total", "kind" => kind).increment(1);
}

pub fn record_compression(codec: &'static str, original: usize, compressed: usize) {
    counter!("compression_applied_total", "codec" => codec).increment(1);
    if original > 0 {
        histogram!("compression_ratio").record(compressed as f64 / original as f64);
    }
}

pub fn record_stream(bytes: u64) {
    counter!("stream_bytes_total").increment(bytes);
}

pub fn record_request(route: &'static str, status: u16) {
    counter!("http_requests_total", "route" => route, "status" => status.to_string()).increment(1);
}
