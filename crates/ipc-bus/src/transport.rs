//! # Transport Traits
//!
//! Interfaces the IPC service consumes from its transport collaborator.

use async_trait::async_trait;
use futures::future::BoxFuture;
use ipc_types::{ConnectionId, IpcResult, Payload};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Raw channel listener: receives the sender's connection id and the payload.
///
/// Listeners run on the transport's dispatch path and must not block; async
/// work belongs in a spawned task.
pub type Listener = Arc<dyn Fn(ConnectionId, Payload) + Send + Sync>;

/// Request/acknowledge handler registered on the hub.
pub type InvokeHandler =
    Arc<dyn Fn(ConnectionId, Payload) -> BoxFuture<'static, IpcResult<Payload>> + Send + Sync>;

/// Identifies one listener or handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// A live connection to one peer, as seen from the hub.
#[async_trait]
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Fire-and-forget send to a channel on this peer.
    async fn send(&self, channel: &str, payload: Payload) -> IpcResult<()>;
}

/// Hub side of the transport.
pub trait HubTransport: Send + Sync {
    /// Register the request/acknowledge handler for a channel.
    ///
    /// A channel has at most one handler; registering again replaces it.
    fn handle(&self, channel: &str, handler: InvokeHandler) -> ListenerId;

    /// Remove the handler for `channel` if it is still the one identified by `id`.
    fn remove_handler(&self, channel: &str, id: ListenerId) -> bool;

    /// Register a fire-and-forget listener.
    fn on(&self, channel: &str, listener: Listener) -> ListenerId;

    fn remove_listener(&self, channel: &str, id: ListenerId) -> bool;

    /// Look up a live connection by id.
    fn connection(&self, id: ConnectionId) -> Option<Arc<dyn Connection>>;
}

/// Peer side of the transport.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// This peer's connection id, as the hub knows it.
    fn id(&self) -> ConnectionId;

    /// Fire-and-forget send to the hub.
    async fn send(&self, channel: &str, payload: Payload) -> IpcResult<()>;

    /// Send to the hub and await exactly one reply or failure.
    async fn invoke(&self, channel: &str, payload: Payload) -> IpcResult<Payload>;

    /// Register a listener for messages the hub sends to this peer.
    fn on(&self, channel: &str, listener: Listener) -> ListenerId;

    fn remove_listener(&self, channel: &str, id: ListenerId) -> bool;
}

/// Per-channel listener storage shared by transport implementations.
#[derive(Default)]
pub struct ListenerTable {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<String, Vec<(ListenerId, Listener)>>>,
}

impl ListenerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, channel: &str, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .entry(channel.to_string())
            .or_default()
            .push((id, listener));
        id
    }

    pub fn remove(&self, channel: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(entries) = listeners.get_mut(channel) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(channel);
        }
        removed
    }

    pub fn count(&self, channel: &str) -> usize {
        self.listeners.read().get(channel).map_or(0, Vec::len)
    }

    /// Invoke every listener registered for `channel`.
    ///
    /// Listeners are snapshotted first, so a listener may unregister itself
    /// (or others) while being dispatched. A panicking listener is logged and
    /// skipped. Returns the number invoked.
    pub fn dispatch(&self, channel: &str, sender: ConnectionId, payload: &Payload) -> usize {
        let snapshot: Vec<Listener> = match self.listeners.read().get(channel) {
            Some(entries) => entries.iter().map(|(_, l)| l.clone()).collect(),
            None => return 0,
        };
        for listener in &snapshot {
            let call = AssertUnwindSafe(|| listener(sender, payload.clone()));
            if panic::catch_unwind(call).is_err() {
                warn!(channel = %channel, sender = %sender, "Listener panicked");
            }
        }
        snapshot.len()
    }
}
