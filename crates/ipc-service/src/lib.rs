//! # IPC Service
//!
//! Request/response correlation and hub-mediated relay on top of a
//! channel-based transport ([`ipc_bus`]).
//!
//! ## Topology
//!
//! ```text
//!            ┌────────────────────────────┐
//!            │         HubService         │
//!            │  RelayEngine + Pending(hub)│
//!            └──────▲──────────────┬──────┘
//!     invoke /      │              │  PeerMessage{meta}
//!     forward-to-peer              ▼
//!   ┌──────────────────┐    ┌──────────────────┐
//!   │ PeerService (A)  │    │ PeerService (B)  │
//!   │ Pending(peer)    │    │ ListenerRegistry │
//!   └──────────────────┘    └──────────────────┘
//! ```
//!
//! - [`PeerService::invoke`]: direct call to a hub handler, raced against a timeout.
//! - [`PeerService::invoke_to`]: call a handler on another peer; the hub tracks
//!   it by request id and settles it from the target's reply.
//! - [`PeerService::send_to`]: fire-and-forget to another peer.
//!
//! Every pending entry is settled at most once: by its reply, a rejection,
//! its timeout, or `destroy`.
//!
//! ## Example
//!
//! ```rust,ignore
//! let hub = InMemoryHub::new();
//! let config = ServiceConfig::default()
//!     .with_target_resolver(|args| names.get(args.as_str()?).copied());
//! let _hub_service = HubService::new(Arc::new(hub.clone()), config.clone())?;
//!
//! let sub = PeerService::new(Arc::new(hub.connect()), config.clone())?;
//! sub.handle("testSub", |_, data| async move { Ok(data) });
//!
//! let main = PeerService::new(Arc::new(hub.connect()), config)?;
//! let echoed = main.invoke_to("testSub", Request::new(json!([7])).lookup("sub")).await?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod hub;
pub mod naming;
pub mod peer;
pub mod pending;
pub mod registry;
pub mod relay;
pub mod request;
pub mod timeout;

pub use config::{ConfigError, ServiceConfig, TargetResolver};
pub use hub::HubService;
pub use naming::ChannelNamer;
pub use peer::PeerService;
pub use pending::{PendingRequestTable, PendingStats};
pub use registry::{CallContext, ListenerHandle, ListenerRegistry};
pub use relay::RelayEngine;
pub use request::Request;
pub use timeout::race_with_timeout;
