use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "venuebook_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "venuebook_query_duration_seconds";

// ── Booking domain ──────────────────────────────────────────────

/// Counter: bookings created.
pub const BOOKINGS_CREATED_TOTAL: &str = "venuebook_bookings_created_total";

/// Counter: writes refused because the slot overlaps an active booking.
pub const BOOKING_CONFLICTS_TOTAL: &str = "venuebook_booking_conflicts_total";

/// Counter: status transitions applied. Labels: to.
pub const BOOKING_TRANSITIONS_TOTAL: &str = "venuebook_booking_transitions_total";

/// Counter: payments recorded and refunded. Labels: outcome.
pub const BOOKING_PAYMENTS_TOTAL: &str = "venuebook_booking_payments_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "venuebook_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "venuebook_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "venuebook_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "venuebook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "venuebook_wal_flush_batch_size";

/// Counter: WAL compactions run by the maintenance task.
pub const WAL_COMPACTIONS_TOTAL: &str = "venuebook_wal_compactions_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::RegisterVenue { .. } => "register_venue",
        Command::UpdateVenue { .. } => "update_venue",
        Command::CreateBooking { .. } => "create_booking",
        Command::UpdateBooking { .. } => "update_booking",
        Command::ChangeStatus { .. } => "change_status",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::RecordPayment { .. } => "record_payment",
        Command::RefundPayment { .. } => "refund_payment",
        Command::SelectVenues { .. } => "select_venues",
        Command::SelectBooking { .. } => "select_booking",
        Command::SelectBookings { .. } => "select_bookings",
        Command::SelectBookingStats { .. } => "select_booking_stats",
        Command::SelectPayment { .. } => "select_payment",
        Command::SelectDateAvailability { .. } => "select_date_availability",
        Command::SelectTimeSlot { .. } => "select_time_slot",
        Command::SelectFreeSlots { .. } => "select_free_slots",
        Command::SelectMonthly { .. } => "select_monthly_availability",
        Command::SelectConflicts { .. } => "select_conflicts",
        Command::Listen { .. } => "listen",
        Command::Unlisten { .. } => "unlisten",
        Command::UnlistenAll => "unlisten_all",
    }
}
