//! Metrics collection and exposition.
//!
//! # Metrics
//! - `expressway_requests_total` (counter): finished requests by method, status
//! - `expressway_request_duration_seconds` (histogram): latency by method
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Labels are low-cardinality: never the path

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "expressway_requests_total";
pub const REQUEST_DURATION: &str = "expressway_request_duration_seconds";

/// Record one finished request.
pub fn record_request(method: &str, status: u16, started: Instant) {
    let method = method.to_uppercase();
    metrics::counter!(REQUESTS_TOTAL, "method" => method.clone(), "status" => status.to_string())
        .increment(1);
    metrics::histogram!(REQUEST_DURATION, "method" => method)
        .record(started.elapsed().as_secs_f64());
}

/// Install the Prometheus recorder with a scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_harmless() {
        record_request("get", 200, Instant::now());
    }
}
