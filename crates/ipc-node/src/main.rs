//! IPC node entry point.

use anyhow::{Context, Result};
use ipc_node::NodeRuntime;
use ipc_service::ServiceConfig;
use ipc_telemetry::{encode_metrics, init_telemetry, TelemetryConfig};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::for_process("node"))
        .context("failed to initialize telemetry")?;

    let config = ServiceConfig::from_env();
    info!(?config, "Loaded configuration");

    let runtime = NodeRuntime::new(config)?;
    runtime.install_handlers();
    runtime.run_demo().await?;

    if let Ok(metrics) = encode_metrics() {
        debug!(%metrics, "Metrics snapshot");
    }

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    runtime.shutdown();
    Ok(())
}
