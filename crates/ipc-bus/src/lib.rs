//! # IPC Bus - Transport Seam
//!
//! The IPC service never talks to a concrete transport. It consumes the
//! traits in [`transport`], which model the four primitives a channel-based
//! message layer has to offer:
//!
//! - fire-and-forget send to a channel
//! - request/acknowledge (send and await exactly one reply or failure)
//! - listener registration and removal
//! - addressing a remote connection by an opaque identifier (hub only)
//!
//! ```text
//! ┌──────────────┐   send / invoke    ┌──────────────┐
//! │    Peer      │ ─────────────────▶ │     Hub      │
//! │ PeerTransport│ ◀───────────────── │ HubTransport │
//! └──────────────┘  Connection::send  └──────────────┘
//! ```
//!
//! [`memory`] provides an in-process implementation on tokio channels with
//! per-connection ordered delivery, used by the test suite and the demo node.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod memory;
pub mod transport;

pub use memory::{InMemoryHub, InMemoryPeer};
pub use transport::{
    Connection, HubTransport, InvokeHandler, Listener, ListenerId, ListenerTable, PeerTransport,
};
