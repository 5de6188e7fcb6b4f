use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── Ledger ──────────────────────────────────────────────────────

/// Counter: booking attempts. Labels: outcome (`booked` or an error label).
pub const BOOKINGS_TOTAL: &str = "cubicled_bookings_total";

/// Counter: lifecycle writes that landed. Labels: to.
pub const TRANSITIONS_TOTAL: &str = "cubicled_lifecycle_transitions_total";

/// Counter: reservations removed by release.
pub const RELEASES_TOTAL: &str = "cubicled_releases_total";

// ── Sweeps ──────────────────────────────────────────────────────

/// Counter: reservations moved to expired by the expiry sweep.
pub const SWEEP_EXPIRED_TOTAL: &str = "cubicled_sweep_expired_total";

/// Counter: per-record sweep failures. Labels: sweep.
pub const SWEEP_FAILURES_TOTAL: &str = "cubicled_sweep_failures_total";

/// Counter: grid dates deactivated by cleanup.
pub const GRID_DEACTIVATIONS_TOTAL: &str = "cubicled_grid_deactivations_total";

// ── Reports ─────────────────────────────────────────────────────

pub const REPORTS_GENERATED_TOTAL: &str = "cubicled_reports_generated_total";

/// Counter: generation requests answered with the stored report.
pub const REPORTS_REUSED_TOTAL: &str = "cubicled_reports_reused_total";

pub const REPORTS_PURGED_TOTAL: &str = "cubicled_reports_purged_total";

/// Histogram: time spent gathering and aggregating one report, in seconds.
pub const REPORT_DURATION_SECONDS: &str = "cubicled_report_duration_seconds";

// ── WAL ─────────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "cubicled_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "cubicled_wal_flush_batch_size";

pub const WAL_COMPACTIONS_TOTAL: &str = "cubicled_wal_compactions_total";

/// Install the Prometheus exporter on `port`. No-op without a port.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
