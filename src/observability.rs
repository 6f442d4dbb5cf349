use std::net::SocketAddr;

use crate::wire::Request;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total operations executed. Labels: op, status.
pub const OPS_TOTAL: &str = "kitbook_ops_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OP_DURATION_SECONDS: &str = "kitbook_op_duration_seconds";

/// Counter: reservation conflicts reported to callers.
pub const CONFLICTS_TOTAL: &str = "kitbook_conflicts_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "kitbook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "kitbook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "kitbook_connections_rejected_total";

/// Counter: handshake/auth failures.
pub const AUTH_FAILURES_TOTAL: &str = "kitbook_auth_failures_total";

/// Counter: reservations pruned by the reaper.
pub const RESERVATIONS_PRUNED_TOTAL: &str = "kitbook_reservations_pruned_total";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "kitbook_journal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "kitbook_journal_flush_batch_size";

/// Install the Prometheus metrics exporter on the given port. No-op if None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a request variant to a short label for metrics.
pub fn op_label(req: &Request) -> &'static str {
    match req {
        Request::Hello { .. } => "hello",
        Request::RegisterItem { .. } => "register_item",
        Request::UpdateItem { .. } => "update_item",
        Request::RetireItem { .. } => "retire_item",
        Request::ListItems { .. } => "list_items",
        Request::Availability { .. } => "availability",
        Request::FreeWindows { .. } => "free_windows",
        Request::Reserve { .. } => "reserve",
        Request::Release { .. } => "release",
        Request::Transfer { .. } => "transfer",
        Request::TransferReservation { .. } => "transfer_reservation",
        Request::ReplaceKit { .. } => "replace_kit",
        Request::HolderView { .. } => "holder_view",
        Request::ItemReservations { .. } => "item_reservations",
        Request::Subscribe { .. } => "subscribe",
    }
}
