//! # IPC Telemetry
//!
//! Logging and metrics for processes running the IPC service.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ipc_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//!     // correlation and relay events are now logged and counted
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `IPC_SERVICE_NAME` | `ipc-service` | Service name attached to logs |
//! | `IPC_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `IPC_JSON_LOGS` | `false` | Emit JSON logs |
//! | `IPC_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, PENDING_REQUESTS, RELAYS_FORWARDED,
    RELAYS_SENT, REQUESTS_DROPPED, REQUESTS_ISSUED, REQUESTS_REJECTED, REQUESTS_TIMED_OUT,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and register metrics.
///
/// Hold the returned guard for the lifetime of the process.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    init_logging(&config)?;

    tracing::info!(service = %config.service_name, "Telemetry initialized");

    Ok(TelemetryGuard { _metrics: metrics })
}

/// Keeps telemetry alive.
pub struct TelemetryGuard {
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry");
    }
}

/// Bump a request or relay counter, with role/kind labels for the vector metrics.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
