use std::net::SocketAddr;
use std::time::Instant;

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: lifecycle operations executed. Labels: operation, status.
pub const OPERATIONS_TOTAL: &str = "vetcal_operations_total";

/// Histogram: lifecycle operation latency in seconds. Labels: operation.
pub const OPERATION_DURATION_SECONDS: &str = "vetcal_operation_duration_seconds";

/// Counter: bookings or reschedules refused because the calendar was occupied.
pub const CONFLICTS_TOTAL: &str = "vetcal_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "vetcal_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "vetcal_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Record outcome and latency of one lifecycle operation.
pub fn record_operation<T>(operation: &'static str, started: Instant, result: &Result<T, EngineError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    if matches!(result, Err(EngineError::Conflict { .. })) {
        metrics::counter!(CONFLICTS_TOTAL).increment(1);
    }
    metrics::counter!(OPERATIONS_TOTAL, "operation" => operation, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}
