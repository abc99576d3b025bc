//! Metrics collection and export for Huddle.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use huddle_core::{Delivery, FrameOutcome, RouteError};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "huddle_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "huddle_connections_active";
    pub const CONNECTIONS_REJECTED: &str = "huddle_connections_rejected_total";
    pub const FRAMES_INBOUND: &str = "huddle_frames_inbound_total";
    pub const EVENTS_OUTBOUND: &str = "huddle_events_outbound_total";
    pub const DELIVERY_FAILURES: &str = "huddle_delivery_failures_total";
    pub const EVICTIONS: &str = "huddle_evictions_total";
    pub const GROUPS_ACTIVE: &str = "huddle_groups_active";
    pub const USERS_ONLINE: &str = "huddle_users_online";
    pub const ERRORS_TOTAL: &str = "huddle_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(
        names::CONNECTIONS_REJECTED,
        "Connections rejected because the room does not exist"
    );
    metrics::describe_counter!(
        names::FRAMES_INBOUND,
        "Inbound client frames by routing outcome"
    );
    metrics::describe_counter!(
        names::EVENTS_OUTBOUND,
        "Events written to client transports"
    );
    metrics::describe_counter!(
        names::DELIVERY_FAILURES,
        "Members evicted because a delivery failed"
    );
    metrics::describe_counter!(
        names::EVICTIONS,
        "Connections closed because their mailbox overflowed"
    );
    metrics::describe_gauge!(names::GROUPS_ACTIVE, "Current number of live groups");
    metrics::describe_gauge!(names::USERS_ONLINE, "Online users summed across rooms");
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a connection rejected before joining.
pub fn record_rejection() {
    counter!(names::CONNECTIONS_REJECTED).increment(1);
}

/// Record the outcome of one inbound frame.
pub fn record_frame(outcome: &Result<FrameOutcome, RouteError>) {
    let (label, delivery) = match outcome {
        Ok(FrameOutcome::Broadcast(d)) => ("broadcast", Some(*d)),
        Ok(FrameOutcome::PrivateMessage(d)) => ("private_message", Some(*d)),
        Ok(FrameOutcome::Ignored) => ("ignored", None),
        Err(RouteError::Malformed(_)) => ("malformed", None),
        Err(RouteError::Unauthorized) => ("unauthorized", None),
    };
    counter!(names::FRAMES_INBOUND, "outcome" => label).increment(1);
    if let Some(delivery) = delivery {
        record_delivery(delivery);
    }
}

/// Record delivery failures of a chat or private message fan-out.
pub fn record_delivery(delivery: Delivery) {
    if delivery.failed > 0 {
        counter!(names::DELIVERY_FAILURES).increment(delivery.failed as u64);
    }
}

/// Record a connection closed as a slow consumer.
pub fn record_eviction() {
    counter!(names::EVICTIONS).increment(1);
}

/// Record an event written to a client.
pub fn record_outbound(kind: &'static str) {
    counter!(names::EVENTS_OUTBOUND, "type" => kind).increment(1);
}

/// Update registry gauges.
pub fn set_registry_stats(groups: usize, online: usize) {
    gauge!(names::GROUPS_ACTIVE).set(groups as f64);
    gauge!(names::USERS_ONLINE).set(online as f64);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
