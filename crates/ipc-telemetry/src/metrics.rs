//! Prometheus metrics for the IPC service.
//!
//! All metrics follow the naming convention: `ipc_<area>_<metric>_<unit>`.
//! Counters are labelled by `role` (`hub` or `peer`) where both sides record
//! the same event.

use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, Gauge, IntCounter, Opts, Registry, TextEncoder};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Requests issued that expect a reply
    pub static ref REQUESTS_ISSUED: CounterVec = CounterVec::new(
        Opts::new("ipc_requests_issued_total", "Requests issued that expect a reply"),
        &["role", "kind"]  // kind: invoke/invoke_to/invoke_peer
    ).expect("metric creation failed");

    /// Pending entries settled by their timeout
    pub static ref REQUESTS_TIMED_OUT: CounterVec = CounterVec::new(
        Opts::new("ipc_requests_timed_out_total", "Requests that hit their timeout"),
        &["role"]
    ).expect("metric creation failed");

    /// Pending entries rejected (handler failure, relay failure)
    pub static ref REQUESTS_REJECTED: CounterVec = CounterVec::new(
        Opts::new("ipc_requests_rejected_total", "Requests settled with an error"),
        &["role"]
    ).expect("metric creation failed");

    /// Pending entries dropped at shutdown
    pub static ref REQUESTS_DROPPED: CounterVec = CounterVec::new(
        Opts::new("ipc_requests_dropped_total", "Pending requests dropped at shutdown"),
        &["role"]
    ).expect("metric creation failed");

    /// Currently pending entries across all tables in this process
    pub static ref PENDING_REQUESTS: Gauge = Gauge::new(
        "ipc_requests_pending",
        "Requests currently awaiting a reply"
    ).expect("metric creation failed");

    /// Relayed calls forwarded to a target peer
    pub static ref RELAYS_FORWARDED: IntCounter = IntCounter::new(
        "ipc_relay_forwarded_total",
        "Relayed calls forwarded to a target peer"
    ).expect("metric creation failed");

    /// Fire-and-forget relays delivered
    pub static ref RELAYS_SENT: IntCounter = IntCounter::new(
        "ipc_relay_sent_total",
        "Fire-and-forget relays delivered to a target peer"
    ).expect("metric creation failed");
}

/// Handle to the registered metrics.
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Registering twice fails with `MetricsInit`.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(REQUESTS_ISSUED.clone()),
        Box::new(REQUESTS_TIMED_OUT.clone()),
        Box::new(REQUESTS_REJECTED.clone()),
        Box::new(REQUESTS_DROPPED.clone()),
        Box::new(PENDING_REQUESTS.clone()),
        Box::new(RELAYS_FORWARDED.clone()),
        Box::new(RELAYS_SENT.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Render the registry in the Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
