//! Metrics collection and export for Courier.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use anyhow::Result;
use courier_core::BrokerStats;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const SESSIONS_TOTAL: &str = "courier_bridge_sessions_total";
    pub const SESSIONS_ACTIVE: &str = "courier_bridge_sessions_active";
    pub const EVENTS_TOTAL: &str = "courier_events_total";
    pub const COMMANDS_TOTAL: &str = "courier_commands_total";
    pub const EVENT_LATENCY_SECONDS: &str = "courier_event_latency_seconds";
    pub const QUEUES_ACTIVE: &str = "courier_queues_active";
    pub const MESSAGES_BUFFERED: &str = "courier_messages_buffered";
    pub const TRANSACTIONS_ACTIVE: &str = "courier_transactions_active";
    pub const ERRORS_TOTAL: &str = "courier_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::SESSIONS_TOTAL,
        "Total number of bridge sessions since server start"
    );
    metrics::describe_gauge!(names::SESSIONS_ACTIVE, "Current number of bridge sessions");
    metrics::describe_counter!(names::EVENTS_TOTAL, "Transport events handled, by kind");
    metrics::describe_counter!(names::COMMANDS_TOTAL, "Commands emitted, by kind");
    metrics::describe_histogram!(
        names::EVENT_LATENCY_SECONDS,
        "Broker event handling latency in seconds"
    );
    metrics::describe_gauge!(names::QUEUES_ACTIVE, "Current number of queues");
    metrics::describe_gauge!(names::MESSAGES_BUFFERED, "Messages buffered in queues");
    metrics::describe_gauge!(names::TRANSACTIONS_ACTIVE, "Current number of open transactions");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a handled event.
pub fn record_event(kind: &'static str, seconds: f64) {
    counter!(names::EVENTS_TOTAL, "kind" => kind).increment(1);
    histogram!(names::EVENT_LATENCY_SECONDS).record(seconds);
}

/// Record an emitted command.
pub fn record_command(kind: &'static str) {
    counter!(names::COMMANDS_TOTAL, "kind" => kind).increment(1);
}

/// Update broker gauges.
pub fn set_broker_stats(stats: &BrokerStats) {
    gauge!(names::QUEUES_ACTIVE).set(stats.router.queue_count as f64);
    gauge!(names::MESSAGES_BUFFERED).set(stats.router.buffered_messages as f64);
    gauge!(names::TRANSACTIONS_ACTIVE).set(stats.active_transactions as f64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that tracks a bridge session for its lifetime.
pub struct SessionMetricsGuard;

impl SessionMetricsGuard {
    /// Create a new metrics guard, recording a session.
    #[must_use]
    pub fn new() -> Self {
        counter!(names::SESSIONS_TOTAL).increment(1);
        gauge!(names::SESSIONS_ACTIVE).increment(1.0);
        Self
    }
}

impl Default for SessionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionMetricsGuard {
    fn drop(&mut self) {
        gauge!(names::SESSIONS_ACTIVE).decrement(1.0);
    }
}
