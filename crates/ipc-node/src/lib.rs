//! # IPC Node
//!
//! Wires a hub and two named peers (`main` and `sub`) over the in-memory
//! transport and exercises every call path once.
//!
//! ## Startup Sequence
//!
//! 1. Load [`ServiceConfig`] from the environment
//! 2. Start the hub service with a [`PeerDirectory`] resolver
//! 3. Connect the peers and register their names and handlers
//! 4. Run the demo calls

pub mod directory;

pub use directory::PeerDirectory;

use anyhow::{Context, Result};
use ipc_bus::InMemoryHub;
use ipc_service::{HubService, PeerService, Request, ServiceConfig};
use ipc_types::IpcError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Hub plus peers running in one process.
pub struct NodeRuntime {
    hub: InMemoryHub,
    directory: PeerDirectory,
    hub_service: HubService,
    main: PeerService,
    sub: PeerService,
}

impl NodeRuntime {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let directory = PeerDirectory::new();
        let resolver = directory.clone();
        let config = config.with_target_resolver(move |args| resolver.resolve(args));

        let hub = InMemoryHub::new();
        let hub_service = HubService::new(Arc::new(hub.clone()), config.clone())
            .context("invalid hub configuration")?;

        let main = PeerService::new(Arc::new(hub.connect()), config.clone())
            .context("invalid peer configuration")?;
        let sub = PeerService::new(Arc::new(hub.connect()), config)
            .context("invalid peer configuration")?;
        directory.register("main", main.id());
        directory.register("sub", sub.id());

        Ok(Self {
            hub,
            directory,
            hub_service,
            main,
            sub,
        })
    }

    pub fn directory(&self) -> &PeerDirectory {
        &self.directory
    }

    /// Register the demo handlers.
    pub fn install_handlers(&self) {
        self.hub_service
            .handle("ping", |_, _| async { Ok(json!(true)) });

        self.sub.handle("testSub", |ctx, data| async move {
            Ok(json!({
                "echo": data,
                "request_id": ctx.request_id().map(|id| id.to_string()),
                "caller": ctx.caller_id().get(),
            }))
        });

        self.sub.receive("notify", |ctx, data| {
            info!(from = %ctx.sender, data = %data, "sub received notification");
        });

        self.main.handle("status", |_, _| async { Ok(json!("ready")) });
    }

    /// Exercise direct, relayed, hub-originated and fire-and-forget calls.
    pub async fn run_demo(&self) -> Result<()> {
        let pong = self
            .main
            .invoke("ping", Request::new(json!(["hello"])))
            .await
            .context("ping failed")?;
        info!(result = %pong, "main -> hub ping");

        let echoed = self
            .main
            .invoke_to(
                "testSub",
                Request::new(json!([7]))
                    .lookup("sub")
                    .with_timeout(Duration::from_secs(1)),
            )
            .await
            .context("relayed call failed")?;
        info!(result = %echoed, "main -> sub relayed call");

        let status = self
            .hub_service
            .invoke_peer("status", Request::new(json!(null)).lookup("main"))
            .await
            .context("hub call failed")?;
        info!(result = %status, "hub -> main call");

        self.main
            .send_to("notify", Request::new(json!("hi")).lookup("sub"))
            .await
            .context("notification failed")?;

        match self
            .main
            .invoke_to("testSub", Request::new(json!([])).lookup("nobody"))
            .await
        {
            Err(IpcError::TargetUnresolved) => info!("unknown peer name rejected"),
            other => warn!(?other, "unexpected result for unknown peer"),
        }

        Ok(())
    }

    /// Reject everything still in flight.
    pub fn shutdown(&self) {
        let dropped =
            self.main.destroy() + self.sub.destroy() + self.hub_service.destroy();
        info!(
            dropped,
            connections = self.hub.connection_count(),
            "Node shut down"
        );
    }
}
